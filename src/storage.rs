//! Collaborator seams around the pipeline: artifact storage, progress and
//! persistence sinks, the response cache, and curated asset fetching.
//!
//! Everything here is replaceable: the orchestrator talks to traits, and
//! the concrete implementations (bucket storage, websocket progress,
//! database persistence) live with the embedding application. A local
//! filesystem storage backend is provided for development and tests.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{GenerationError, Result};

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEntry {
    pub path: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Blob storage for built artifacts. `upload` returns the public URL of the
/// stored object.
pub trait StorageClient: Send + Sync {
    fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        public: bool,
    ) -> impl Future<Output = Result<String>> + Send;

    fn download(&self, path: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;

    fn list(&self, prefix: &str) -> impl Future<Output = Result<Vec<StorageEntry>>> + Send;
}

/// Filesystem-backed storage rooted at a directory. The returned "URL" is
/// the absolute path of the stored file.
#[derive(Debug, Clone)]
pub struct LocalDirStorage {
    root: PathBuf,
}

impl LocalDirStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        // Keys are relative; reject traversal outside the root.
        let relative = Path::new(path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(GenerationError::Storage(format!(
                "invalid storage key: {path}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl StorageClient for LocalDirStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        _content_type: &str,
        _public: bool,
    ) -> Result<String> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        debug!(path, size = bytes.len(), "stored artifact");
        Ok(target.display().to_string())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let target = self.resolve(path)?;
        Ok(tokio::fs::read(&target).await?)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StorageEntry>> {
        let dir = self.resolve(prefix)?;
        let mut entries = Vec::new();
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(_) => return Ok(entries),
        };
        while let Some(entry) = reader.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() {
                entries.push(StorageEntry {
                    path: format!("{prefix}/{}", entry.file_name().to_string_lossy()),
                    size: meta.len(),
                    last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
                });
            }
        }
        Ok(entries)
    }
}

// ============================================================================
// Progress and persistence sinks
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn new(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Fire-and-forget stage notifications. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, project_id: &str, update: &ProgressUpdate);
}

/// Durable bookkeeping for generation runs. Failures are logged and never
/// escalate into the pipeline.
pub trait PersistenceSink: Send + Sync {
    fn log_step(
        &self,
        project_id: &str,
        step: &str,
        detail: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn update_project(
        &self,
        project_id: &str,
        status: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

// ============================================================================
// Response cache
// ============================================================================

struct CacheEntry {
    value: String,
    inserted_at: Instant,
}

/// In-memory cache for model responses and generation-status bookkeeping,
/// keyed by prompt hash with TTL expiry.
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn cache_key(prompt: &str) -> String {
        format!("{:x}", Sha256::digest(prompt.as_bytes()))
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.into(),
            CacheEntry {
                value: value.into(),
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        before - entries.len()
    }
}

// ============================================================================
// Asset fetching
// ============================================================================

/// Downloads curated asset packs and extracts them into a project
/// directory. Zip entries with unsafe paths are skipped.
pub struct AssetFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl AssetFetcher {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Streams an asset to `destination`, returning the byte count.
    pub async fn download(&self, asset_name: &str, destination: &Path) -> Result<u64> {
        let url = format!("{}/{}", self.base_url, asset_name);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        info!(url, "downloading asset");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(GenerationError::Storage(format!(
                "asset download failed: HTTP {} for {url}",
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(destination).await?;
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }
        file.flush().await?;
        debug!(asset_name, downloaded, "asset download complete");
        Ok(downloaded)
    }

    /// Downloads a zip asset and extracts it into `dest_dir`. Returns the
    /// number of files extracted.
    pub async fn download_and_extract(&self, asset_name: &str, dest_dir: &Path) -> Result<usize> {
        tokio::fs::create_dir_all(dest_dir).await?;
        let temp_path = dest_dir.join(format!(".download_temp.{asset_name}"));
        self.download(asset_name, &temp_path).await?;

        let extracted = extract_archive(&temp_path, dest_dir)?;
        let _ = tokio::fs::remove_file(&temp_path).await;
        info!(asset_name, extracted, "asset pack extracted");
        Ok(extracted)
    }
}

/// Extracts a zip file into `dest_dir` using `enclosed_name` so entries
/// cannot escape the destination.
pub fn extract_archive(zip_path: &Path, dest_dir: &Path) -> Result<usize> {
    let file = std::fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut extracted = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let outpath = match entry.enclosed_name() {
            Some(path) => dest_dir.join(path),
            None => {
                warn!(entry = entry.name(), "skipping unsafe zip entry");
                continue;
            }
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut outfile = std::fs::File::create(&outpath)?;
            std::io::copy(&mut entry, &mut outfile)?;
            extracted += 1;
        }
    }
    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[tokio::test]
    async fn test_cache_hit_and_ttl_expiry() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let key = ResponseCache::cache_key("a 2D platformer");
        cache.put(key.clone(), "cached design").await;
        assert_eq!(cache.get(&key).await.as_deref(), Some("cached design"));

        let expired = ResponseCache::new(Duration::from_secs(0));
        expired.put(key.clone(), "stale").await;
        assert_eq!(expired.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_cache_purge_removes_only_expired() {
        let cache = ResponseCache::new(Duration::from_secs(0));
        cache.put("a", "1").await;
        cache.put("b", "2").await;
        assert_eq!(cache.purge_expired().await, 2);
        assert_eq!(cache.purge_expired().await, 0);
    }

    #[test]
    fn test_cache_key_is_stable_hex() {
        let a = ResponseCache::cache_key("prompt");
        let b = ResponseCache::cache_key("prompt");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, ResponseCache::cache_key("other prompt"));
    }

    #[tokio::test]
    async fn test_local_storage_roundtrip_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDirStorage::new(dir.path());

        let url = storage
            .upload("games/abc/game.zip", b"zipbytes", "application/zip", true)
            .await
            .unwrap();
        assert!(url.ends_with("game.zip"));

        let bytes = storage.download("games/abc/game.zip").await.unwrap();
        assert_eq!(bytes, b"zipbytes");

        let entries = storage.list("games/abc").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, 8);
    }

    #[tokio::test]
    async fn test_local_storage_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDirStorage::new(dir.path());
        let err = storage.download("../outside").await;
        assert!(matches!(err, Err(GenerationError::Storage(_))));
    }

    #[test]
    fn test_extract_archive_skips_unsafe_entries() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("pack.zip");

        let mut writer = zip::ZipWriter::new(std::fs::File::create(&zip_path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("safe.txt", options).unwrap();
        writer.write_all(b"ok").unwrap();
        writer.start_file("../evil.txt", options).unwrap();
        writer.write_all(b"no").unwrap();
        writer.finish().unwrap();

        let out = dir.path().join("out");
        let extracted = extract_archive(&zip_path, &out).unwrap();
        assert_eq!(extracted, 1);
        assert!(out.join("safe.txt").exists());
        assert!(!dir.path().join("evil.txt").exists());
    }
}
