use std::{cmp::Reverse, fmt};

use axum::{
  extract::{Query, State},
  Json,
};
use rustube::{Stream, Video};
use serde::{Deserialize, Serialize};

use crate::{AppState, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
  /// single container with both audio and video tracks
  Progressive,
  /// video-only stream, needs an audio track merged in
  Adaptive,
  /// audio-only stream
  Audio,
}

impl FormatKind {
  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "progressive" => Ok(FormatKind::Progressive),
      "adaptive" => Ok(FormatKind::Adaptive),
      "audio" => Ok(FormatKind::Audio),
      _ => Err(Error::UnsupportedFormat(s.to_string())),
    }
  }

  fn as_str(&self) -> &'static str {
    match self {
      FormatKind::Progressive => "progressive",
      FormatKind::Adaptive => "adaptive",
      FormatKind::Audio => "audio",
    }
  }
}

impl fmt::Display for FormatKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Plain description of a remote stream, detached from the library handle so
/// that ranking stays testable offline.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDesc {
  pub itag: u64,
  pub includes_video: bool,
  pub includes_audio: bool,
  pub height: Option<u64>,
  pub fps: u32,
  pub bitrate: Option<u64>,
  pub container: String,
}

impl StreamDesc {
  pub fn from_stream(stream: &Stream) -> Self {
    Self {
      itag: stream.itag,
      includes_video: stream.includes_video_track,
      includes_audio: stream.includes_audio_track,
      height: stream.height,
      fps: stream.fps as u32,
      bitrate: stream.bitrate,
      container: stream.mime.subtype().as_str().to_string(),
    }
  }

  pub fn kind(&self) -> Option<FormatKind> {
    match (self.includes_video, self.includes_audio) {
      (true, true) => Some(FormatKind::Progressive),
      (true, false) => Some(FormatKind::Adaptive),
      (false, true) => Some(FormatKind::Audio),
      (false, false) => None,
    }
  }

  fn quality_label(&self) -> String {
    if self.includes_video {
      match self.height {
        Some(h) => format!("{}p", h),
        None => "unknown".to_string(),
      }
    } else {
      match self.bitrate {
        Some(b) => format!("{}kbps", b / 1000),
        None => "unknown".to_string(),
      }
    }
  }

  fn estimated_size(&self, duration_secs: u64) -> Option<u64> {
    self.bitrate.map(|b| b / 8 * duration_secs)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamOption {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: FormatKind,
  pub itag: u64,
  pub quality: String,
  pub container: String,
  pub estimated_size: Option<u64>,
}

pub fn describe_all(video: &Video) -> Vec<StreamDesc> {
  video.streams().iter().map(StreamDesc::from_stream).collect()
}

/// Ranks the streams of one kind, best first, and assigns positional ids of
/// the form `{kind}_{index}`. The sort is fully deterministic: descending by
/// the quality metric (height/fps/bitrate for video kinds, bitrate for
/// audio), ties broken by ascending itag, so a replayed id always resolves
/// to the same stream.
pub fn list_options(
  streams: &[StreamDesc],
  kind: FormatKind,
  duration_secs: u64,
) -> Vec<StreamOption> {
  let mut matching: Vec<&StreamDesc> = streams
    .iter()
    .filter(|desc| desc.kind() == Some(kind))
    .collect();

  matching.sort_by_key(|desc| {
    (
      Reverse(desc.height.unwrap_or(0)),
      Reverse(desc.fps),
      Reverse(desc.bitrate.unwrap_or(0)),
      desc.itag,
    )
  });

  matching
    .into_iter()
    .enumerate()
    .map(|(index, desc)| StreamOption {
      id: format!("{}_{}", kind, index),
      kind,
      itag: desc.itag,
      quality: desc.quality_label(),
      container: desc.container.clone(),
      estimated_size: desc.estimated_size(duration_secs),
    })
    .collect()
}

pub fn parse_option_id(option_id: &str) -> Result<(FormatKind, usize)> {
  let unknown = || Error::UnknownOption(option_id.to_string());

  let (kind, index) = option_id.rsplit_once('_').ok_or_else(unknown)?;
  let kind = FormatKind::parse(kind).map_err(|_| unknown())?;
  let index = index.parse::<usize>().map_err(|_| unknown())?;

  Ok((kind, index))
}

/// Resolves an option id produced by an earlier listing against a freshly
/// recomputed listing of the same streams.
pub fn resolve_option(
  streams: &[StreamDesc],
  option_id: &str,
  duration_secs: u64,
) -> Result<StreamOption> {
  let (kind, index) = parse_option_id(option_id)?;
  list_options(streams, kind, duration_secs)
    .into_iter()
    .nth(index)
    .ok_or_else(|| Error::UnknownOption(option_id.to_string()))
}

#[derive(Deserialize)]
pub struct FormatsReq {
  cache_id: String,
  format_type: String,
}

#[derive(Serialize)]
pub struct FormatsResp {
  cache_id: String,
  format_type: FormatKind,
  options: Vec<StreamOption>,
}

pub async fn list_formats(
  State(state): State<AppState>,
  Query(req): Query<FormatsReq>,
) -> Result<Json<FormatsResp>> {
  let kind = FormatKind::parse(&req.format_type)?;

  let video = state
    .sessions
    .get(req.cache_id.clone())
    .await?
    .ok_or_else(|| Error::SessionNotFound(req.cache_id.clone()))?;

  let streams = describe_all(&video);
  let duration = video.video_details().length_seconds;

  Ok(Json(FormatsResp {
    cache_id: req.cache_id,
    format_type: kind,
    options: list_options(&streams, kind, duration),
  }))
}
