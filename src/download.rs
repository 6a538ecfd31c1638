use std::path::{Path, PathBuf};

use axum::{
  body::StreamBody,
  extract::{Query, State},
  http::header,
  response::IntoResponse,
};
use rustube::{Stream, Video};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::formats::{
  describe_all, list_options, resolve_option, FormatKind, StreamDesc,
};
use crate::info::fetch_video;
use crate::pipeline::{self, Ffmpeg, Transcoder};
use crate::util::{random_suffix, sanitize_title, DOWNLOAD_DIR};
use crate::{AppState, Error, Result};

#[derive(Deserialize)]
pub struct DownloadReq {
  cache_id: Option<String>,
  option_id: Option<String>,
  // direct single-shot mode, kept from the first revision of the API
  url: Option<String>,
  format: Option<String>,
}

pub async fn download(
  State(state): State<AppState>,
  Query(req): Query<DownloadReq>,
) -> Result<impl IntoResponse> {
  let path = match (req.cache_id, req.url) {
    (Some(cache_id), _) => {
      let option_id = req
        .option_id
        .ok_or(Error::MissingParameter("option_id"))?;
      let video = state
        .sessions
        .get(cache_id.clone())
        .await?
        .ok_or(Error::SessionNotFound(cache_id))?;

      download_option(&video, &option_id, &Ffmpeg).await?
    }
    (None, Some(url)) => {
      let video = fetch_video(&url).await?;
      let format = req.format.as_deref().unwrap_or("mp4");

      download_direct(&video, format, &Ffmpeg).await?
    }
    (None, None) => return Err(Error::MissingParameter("cache_id or url")),
  };

  serve_file(&path).await
}

/// Fetches the stream(s) behind a listed option and produces the final file
/// in the downloads dir. Adaptive options pull the selected video-only
/// stream plus the best audio-only stream and multiplex them; temp inputs
/// are deleted by the pipeline after a successful transcode.
async fn download_option(
  video: &Video,
  option_id: &str,
  transcoder: &dyn Transcoder,
) -> Result<PathBuf> {
  let streams = describe_all(video);
  let details = video.video_details();
  let option = resolve_option(&streams, option_id, details.length_seconds)?;
  let base = base_name(&details.title);

  info!("downloading {} as {}", details.video_id.as_str(), option.id);

  match option.kind {
    FormatKind::Progressive => {
      let path = DOWNLOAD_DIR.join(format!("{}.{}", base, option.container));
      stream_by_itag(video, option.itag)?.download_to(&path).await?;
      Ok(path)
    }
    FormatKind::Audio => {
      let temp =
        DOWNLOAD_DIR.join(format!("{}.source.{}", base, option.container));
      let output = DOWNLOAD_DIR.join(format!("{}.mp3", base));

      stream_by_itag(video, option.itag)?.download_to(&temp).await?;
      pipeline::extract_mp3(transcoder, &temp, &output).await?;
      Ok(output)
    }
    FormatKind::Adaptive => {
      let audio = list_options(&streams, FormatKind::Audio, details.length_seconds)
        .into_iter()
        .next()
        .ok_or_else(|| {
          Error::NoStream("no audio-only stream to merge".to_string())
        })?;

      let video_temp =
        DOWNLOAD_DIR.join(format!("{}.video.{}", base, option.container));
      let audio_temp =
        DOWNLOAD_DIR.join(format!("{}.audio.{}", base, audio.container));
      let output = DOWNLOAD_DIR.join(format!("{}.mp4", base));

      stream_by_itag(video, option.itag)?
        .download_to(&video_temp)
        .await?;
      stream_by_itag(video, audio.itag)?
        .download_to(&audio_temp)
        .await?;

      pipeline::merge_adaptive(transcoder, &video_temp, &audio_temp, &output)
        .await?;
      Ok(output)
    }
  }
}

async fn download_direct(
  video: &Video,
  format: &str,
  transcoder: &dyn Transcoder,
) -> Result<PathBuf> {
  let streams = describe_all(video);
  let duration = video.video_details().length_seconds;
  let option_id = direct_option_id(&streams, format, duration)?;

  download_option(video, &option_id, transcoder).await
}

/// Picks the option behind a direct `format=` request: the best-ranked
/// progressive stream for mp4 (preferring an actual mp4 container over a
/// better-ranked one in another container), the best audio-only stream
/// for mp3.
fn direct_option_id(
  streams: &[StreamDesc],
  format: &str,
  duration_secs: u64,
) -> Result<String> {
  let no_stream = || Error::NoStream(format!("no {} stream available", format));

  match format {
    "mp4" => {
      let options =
        list_options(streams, FormatKind::Progressive, duration_secs);
      options
        .iter()
        .find(|option| option.container == "mp4")
        .or_else(|| options.first())
        .map(|option| option.id.clone())
        .ok_or_else(no_stream)
    }
    "mp3" => {
      let options = list_options(streams, FormatKind::Audio, duration_secs);
      options
        .first()
        .map(|option| option.id.clone())
        .ok_or_else(no_stream)
    }
    other => Err(Error::UnsupportedFormat(other.to_string())),
  }
}

fn stream_by_itag(video: &Video, itag: u64) -> Result<&Stream> {
  video
    .streams()
    .iter()
    .find(|stream| stream.itag == itag)
    .ok_or_else(|| Error::NoStream(format!("itag {}", itag)))
}

fn base_name(title: &str) -> String {
  format!("{}_{}", sanitize_title(title), random_suffix())
}

async fn serve_file(path: &Path) -> Result<impl IntoResponse> {
  let file = tokio::fs::File::open(path).await?;
  let len = file.metadata().await?.len();

  let filename = path
    .file_name()
    .and_then(|name| name.to_str())
    .unwrap_or("download");

  let headers = [
    (header::CONTENT_TYPE, content_type(path).to_string()),
    (header::CONTENT_LENGTH, len.to_string()),
    (
      header::CONTENT_DISPOSITION,
      format!("attachment; filename=\"{}\"", filename),
    ),
  ];

  Ok((headers, StreamBody::new(ReaderStream::new(file))))
}

fn content_type(path: &Path) -> &'static str {
  match path.extension().and_then(|ext| ext.to_str()) {
    Some("mp3") => "audio/mpeg",
    Some("mp4") => "video/mp4",
    Some("m4a") => "audio/mp4",
    Some("webm") => "video/webm",
    _ => "application/octet-stream",
  }
}

#[cfg(test)]
mod test {
  use axum::http::StatusCode;
  use axum::response::IntoResponse;

  use super::*;
  use crate::session::SessionStore;
  use crate::SESSION_CAPACITY;

  fn progressive(itag: u64, height: u64, container: &str) -> StreamDesc {
    StreamDesc {
      itag,
      includes_video: true,
      includes_audio: true,
      height: Some(height),
      fps: 30,
      bitrate: Some(1_000_000),
      container: container.to_string(),
    }
  }

  fn audio_only(itag: u64, bitrate: u64) -> StreamDesc {
    StreamDesc {
      itag,
      includes_video: false,
      includes_audio: true,
      height: None,
      fps: 0,
      bitrate: Some(bitrate),
      container: "m4a".to_string(),
    }
  }

  #[test]
  fn test_direct_mp4_prefers_mp4_container() {
    // the webm stream ranks higher, but an mp4 request gets the mp4 one
    let streams = vec![
      progressive(100, 1080, "webm"),
      progressive(22, 720, "mp4"),
      audio_only(140, 128_000),
    ];

    let id = direct_option_id(&streams, "mp4", 600).unwrap();
    assert_eq!(id, "progressive_1");
    assert_eq!(resolve_option(&streams, &id, 600).unwrap().itag, 22);
  }

  #[test]
  fn test_direct_mp4_falls_back_to_other_containers() {
    let streams = vec![progressive(100, 1080, "webm")];

    assert_eq!(direct_option_id(&streams, "mp4", 600).unwrap(), "progressive_0");
  }

  #[test]
  fn test_direct_mp3_takes_best_audio() {
    let streams = vec![audio_only(140, 128_000), audio_only(251, 160_000)];

    let id = direct_option_id(&streams, "mp3", 600).unwrap();
    assert_eq!(id, "audio_0");
    assert_eq!(resolve_option(&streams, &id, 600).unwrap().itag, 251);
  }

  #[test]
  fn test_direct_without_matching_streams() {
    assert!(matches!(
      direct_option_id(&[], "mp4", 600),
      Err(Error::NoStream(_))
    ));
    assert!(matches!(
      direct_option_id(&[progressive(22, 720, "mp4")], "mp3", 600),
      Err(Error::NoStream(_))
    ));
  }

  #[test]
  fn test_direct_unknown_format() {
    assert!(matches!(
      direct_option_id(&[], "flac", 600),
      Err(Error::UnsupportedFormat(_))
    ));
  }

  #[tokio::test]
  async fn test_download_unknown_cache_id_is_not_found() {
    let state = AppState {
      sessions: SessionStore::new(SESSION_CAPACITY).spawn(),
    };
    let req = DownloadReq {
      cache_id: Some("deadbeef".to_string()),
      option_id: Some("progressive_0".to_string()),
      url: None,
      format: None,
    };

    match download(State(state), Query(req)).await {
      Ok(_) => panic!("expected an error for an absent cache id"),
      Err(err) => {
        assert!(matches!(err, Error::SessionNotFound(_)));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
      }
    }
  }

  #[test]
  fn test_base_name_is_sanitized_and_unique() {
    let a = base_name("My Video: part 1");
    let b = base_name("My Video: part 1");

    assert!(a.starts_with("My_Video_part_1_"));
    assert_ne!(a, b);
  }

  #[test]
  fn test_content_type() {
    assert_eq!(content_type(Path::new("a/b.mp3")), "audio/mpeg");
    assert_eq!(content_type(Path::new("a/b.mp4")), "video/mp4");
    assert_eq!(content_type(Path::new("b.m4a")), "audio/mp4");
    assert_eq!(content_type(Path::new("b")), "application/octet-stream");
  }
}
