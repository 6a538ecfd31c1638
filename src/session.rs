use std::collections::{HashMap, VecDeque};

use axum::{extract::State, Json};
use kameo::{actor::ActorRef, messages, Actor, Reply};
use rustube::Video;
use serde::Serialize;
use tracing::debug;

use crate::{AppState, Result};

/// Insertion-order bounded map. When a new entry pushes the size past the
/// capacity, the oldest-inserted entry is dropped, no matter how recently it
/// was read (strict FIFO, not LRU).
pub struct FifoCache<V> {
  capacity: usize,
  order: VecDeque<String>,
  entries: HashMap<String, V>,
}

impl<V> FifoCache<V> {
  pub fn new(capacity: usize) -> Self {
    assert!(capacity > 0);
    Self {
      capacity,
      order: VecDeque::with_capacity(capacity + 1),
      entries: HashMap::with_capacity(capacity + 1),
    }
  }

  /// Inserts and returns the evicted key, if the bound was exceeded.
  pub fn insert(&mut self, key: String, value: V) -> Option<String> {
    if self.entries.insert(key.clone(), value).is_none() {
      self.order.push_back(key);
    }

    if self.entries.len() > self.capacity {
      let oldest = self.order.pop_front()?;
      self.entries.remove(&oldest);
      return Some(oldest);
    }

    None
  }

  pub fn get(&self, key: &str) -> Option<&V> {
    self.entries.get(key)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Keys in insertion order, oldest first.
  pub fn keys(&self) -> Vec<String> {
    self.order.iter().cloned().collect()
  }
}

#[derive(Debug, Clone, Serialize, Reply)]
pub struct CacheStats {
  pub size: usize,
  pub capacity: usize,
  pub keys: Vec<String>,
}

#[derive(Actor)]
pub struct SessionStore {
  videos: FifoCache<Video>,
}

#[derive(Clone)]
pub struct SessionStoreRef(ActorRef<SessionStore>);

#[messages]
impl SessionStore {
  #[message]
  async fn put(&mut self, video: Video) -> String {
    let cache_id = new_cache_id();
    if let Some(evicted) = self.videos.insert(cache_id.clone(), video) {
      debug!("evicted oldest session: {}", evicted);
    }
    cache_id
  }

  #[message]
  async fn get(&mut self, cache_id: String) -> Option<Video> {
    self.videos.get(&cache_id).cloned()
  }

  #[message]
  async fn stats(&mut self) -> CacheStats {
    CacheStats {
      size: self.videos.len(),
      capacity: self.videos.capacity(),
      keys: self.videos.keys(),
    }
  }
}

impl SessionStore {
  pub fn new(capacity: usize) -> Self {
    Self {
      videos: FifoCache::new(capacity),
    }
  }

  pub fn spawn(self) -> SessionStoreRef {
    SessionStoreRef(kameo::spawn(self))
  }
}

impl SessionStoreRef {
  pub async fn put(&self, video: Video) -> Result<String> {
    Ok(self.0.ask(Put { video }).send().await.unwrap())
  }

  pub async fn get(&self, cache_id: String) -> Result<Option<Video>> {
    Ok(self.0.ask(Get { cache_id }).send().await.unwrap())
  }

  pub async fn stats(&self) -> Result<CacheStats> {
    Ok(self.0.ask(Stats {}).send().await.unwrap())
  }
}

// 32 hex chars, same shape as the uuid4 hex ids of earlier revisions.
fn new_cache_id() -> String {
  format!("{:032x}", rand::random::<u128>())
}

pub async fn cache_stats(
  State(state): State<AppState>,
) -> Result<Json<CacheStats>> {
  Ok(Json(state.sessions.stats().await?))
}
