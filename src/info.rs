use axum::{
  extract::{Query, State},
  Json,
};
use rustube::{Id, Video, VideoFetcher};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::formats::{describe_all, FormatKind, StreamDesc};
use crate::{AppState, Error, Result};

#[derive(Deserialize)]
pub struct InfoReq {
  url: String,
}

#[derive(Serialize)]
pub struct InfoResp {
  cache_id: String,
  video_id: String,
  title: String,
  author: String,
  duration: u64,
  thumbnail_url: Option<String>,
  available_formats: Vec<&'static str>,
}

pub async fn video_info(
  State(state): State<AppState>,
  Query(req): Query<InfoReq>,
) -> Result<Json<InfoResp>> {
  let video = fetch_video(&req.url).await?;
  let details = video.video_details();
  let streams = describe_all(&video);

  info!("fetched video {} ({})", details.video_id.as_str(), details.title);

  Ok(Json(InfoResp {
    video_id: details.video_id.as_str().to_string(),
    title: details.title.clone(),
    author: details.author.clone(),
    duration: details.length_seconds,
    thumbnail_url: details.thumbnails.last().map(|t| t.url.clone()),
    available_formats: available_formats(&streams),
    cache_id: state.sessions.put(video).await?,
  }))
}

pub(crate) async fn fetch_video(url: &str) -> Result<Video> {
  let id = Id::from_raw(url)
    .map_err(|_| Error::InvalidUrl(url.to_string()))?
    .as_owned();

  Ok(VideoFetcher::from_id(id)?.fetch().await?.descramble()?)
}

/// Container labels the client can ask for: mp4 needs a video track
/// somewhere, mp3 needs an audio-only stream to convert.
fn available_formats(streams: &[StreamDesc]) -> Vec<&'static str> {
  let mut formats = Vec::new();

  let has_video = streams.iter().any(|desc| {
    matches!(
      desc.kind(),
      Some(FormatKind::Progressive) | Some(FormatKind::Adaptive)
    )
  });
  let has_audio = streams
    .iter()
    .any(|desc| desc.kind() == Some(FormatKind::Audio));

  if has_video {
    formats.push("mp4");
  }
  if has_audio {
    formats.push("mp3");
  }

  formats
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_video_id_from_urls() {
    for url in [
      "https://youtu.be/abc12345678",
      "https://www.youtube.com/watch?v=abc12345678",
      "abc12345678",
    ] {
      let id = Id::from_raw(url).unwrap();
      assert_eq!(id.as_str(), "abc12345678");
    }
  }

  #[test]
  fn test_non_youtube_url_rejected() {
    assert!(Id::from_raw("https://example.com/watch?v=abc12345678").is_err());
  }

  #[test]
  fn test_available_formats() {
    let audio = StreamDesc {
      itag: 140,
      includes_video: false,
      includes_audio: true,
      height: None,
      fps: 0,
      bitrate: Some(128_000),
      container: "m4a".to_string(),
    };
    let video = StreamDesc {
      itag: 137,
      includes_video: true,
      includes_audio: false,
      height: Some(1080),
      fps: 30,
      bitrate: Some(4_500_000),
      container: "mp4".to_string(),
    };

    assert_eq!(
      available_formats(&[audio.clone(), video.clone()]),
      vec!["mp4", "mp3"]
    );
    assert_eq!(available_formats(&[video]), vec!["mp4"]);
    assert_eq!(available_formats(&[audio]), vec!["mp3"]);
    assert!(available_formats(&[]).is_empty());
  }
}
