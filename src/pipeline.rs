use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::util::FFMPEG_MUTEX;
use crate::{Error, Result};

// invoke ffmpeg for container conversion and stream multiplexing.
// requires ffmpeg executable to be in PATH.
#[async_trait]
pub trait Transcoder: Send + Sync {
  /// Strips the video track and re-encodes the audio to mp3.
  async fn to_mp3(&self, input: &Path, output: &Path) -> Result<()>;

  /// Multiplexes a video-only and an audio-only stream into one container.
  /// The video track is copied without re-encoding, audio is re-encoded.
  async fn merge(
    &self,
    video: &Path,
    audio: &Path,
    output: &Path,
  ) -> Result<()>;
}

pub struct Ffmpeg;

#[async_trait]
impl Transcoder for Ffmpeg {
  async fn to_mp3(&self, input: &Path, output: &Path) -> Result<()> {
    run_ffmpeg(mp3_args(input, output)).await
  }

  async fn merge(
    &self,
    video: &Path,
    audio: &Path,
    output: &Path,
  ) -> Result<()> {
    run_ffmpeg(merge_args(video, audio, output)).await
  }
}

fn mp3_args(input: &Path, output: &Path) -> Vec<OsString> {
  vec![
    "-i".into(),
    input.into(),
    "-vn".into(),
    "-ab".into(),
    "192k".into(),
    "-ar".into(),
    "44100".into(),
    "-y".into(),
    output.into(),
  ]
}

fn merge_args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
  vec![
    "-i".into(),
    video.into(),
    "-i".into(),
    audio.into(),
    "-c:v".into(),
    "copy".into(),
    "-c:a".into(),
    "aac".into(),
    "-y".into(),
    output.into(),
  ]
}

async fn run_ffmpeg(args: Vec<OsString>) -> Result<()> {
  info!("running ffmpeg {:?}", args);

  let guard = FFMPEG_MUTEX.acquire().await.unwrap();
  let output = Command::new("ffmpeg").args(&args).output().await?;
  drop(guard);

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    return Err(Error::Transcode(stderr.trim().to_string()));
  }

  Ok(())
}

/// Converts a downloaded audio stream to mp3. The temp input is deleted
/// whether the transcode succeeded or not.
pub async fn extract_mp3(
  transcoder: &dyn Transcoder,
  input: &Path,
  output: &Path,
) -> Result<()> {
  let result = transcoder.to_mp3(input, output).await;
  remove_temp(input).await;
  result
}

/// Merges separate video and audio downloads. Both temp inputs are deleted
/// whether the transcode succeeded or not.
pub async fn merge_adaptive(
  transcoder: &dyn Transcoder,
  video: &Path,
  audio: &Path,
  output: &Path,
) -> Result<()> {
  let result = transcoder.merge(video, audio, output).await;
  remove_temp(video).await;
  remove_temp(audio).await;
  result
}

async fn remove_temp(path: &Path) {
  if let Err(err) = tokio::fs::remove_file(path).await {
    warn!("failed to remove temp file {}: {}", path.display(), err);
  }
}
