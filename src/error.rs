use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("failed to extract video: {0}")]
  Extraction(#[from] rustube::Error),

  #[error("invalid video url: {0}")]
  InvalidUrl(String),

  #[error("unknown cache id: {0}")]
  SessionNotFound(String),

  #[error("unknown option id: {0}")]
  UnknownOption(String),

  #[error("unsupported format type: {0}")]
  UnsupportedFormat(String),

  #[error("missing query parameter: {0}")]
  MissingParameter(&'static str),

  #[error("no matching stream: {0}")]
  NoStream(String),

  #[error("ffmpeg failed: {0}")]
  Transcode(String),

  #[error(transparent)]
  IO(#[from] std::io::Error),
}

impl Error {
  fn status(&self) -> StatusCode {
    match self {
      Error::SessionNotFound(_) => StatusCode::NOT_FOUND,
      Error::InvalidUrl(_)
      | Error::UnknownOption(_)
      | Error::UnsupportedFormat(_)
      | Error::MissingParameter(_) => StatusCode::BAD_REQUEST,
      Error::Extraction(_)
      | Error::NoStream(_)
      | Error::Transcode(_)
      | Error::IO(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status();
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
