use axum::{routing::get, Json, Router};
use serde_json::json;
use tracing::info;

mod download;
mod error;
mod formats;
mod info;
mod pipeline;
mod session;
mod util;

pub use error::{Error, Result};

use session::{SessionStore, SessionStoreRef};

// bounded session cache: only the last N fetched video handles are kept.
pub const SESSION_CAPACITY: usize = 10;

#[derive(Clone)]
pub struct AppState {
  pub sessions: SessionStoreRef,
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  std::fs::create_dir_all(&*util::DOWNLOAD_DIR)?;

  let state = AppState {
    sessions: SessionStore::new(SESSION_CAPACITY).spawn(),
  };

  let app = Router::new()
    .route("/", get(root))
    .route("/info", get(info::video_info))
    .route("/formats", get(formats::list_formats))
    .route("/download", get(download::download))
    .route("/cache", get(session::cache_stats))
    .with_state(state);

  info!("Listening on 0.0.0.0:8080");

  axum::Server::bind(&"0.0.0.0:8080".parse().unwrap())
    .serve(app.into_make_service())
    .await
    .expect("Failed to start server");

  Ok(())
}

async fn root() -> Json<serde_json::Value> {
  Json(json!({ "message": "YouTube Downloader API is running" }))
}
