use std::{path::PathBuf, sync::LazyLock};

use tokio::sync::Semaphore;

// ensure only a limited number of ffmpeg processes at a time
pub static FFMPEG_MUTEX: LazyLock<Semaphore> = LazyLock::new(|| {
  let concurrency = std::env::var("FFMPEG_CONCURRENCY")
    .ok()
    .and_then(|s| s.parse::<usize>().ok())
    .unwrap_or(1);
  Semaphore::new(concurrency)
});

pub static DOWNLOAD_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
  std::env::var("DOWNLOAD_DIR")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("downloads"))
});

// keep alphanumerics, spaces, dots and underscores, then join on '_'.
pub fn sanitize_title(title: &str) -> String {
  title
    .chars()
    .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '_'))
    .collect::<String>()
    .trim()
    .replace(' ', "_")
}

pub fn random_suffix() -> String {
  format!("{:016x}", rand::random::<u64>())
}
