pub mod mp4;

use reqwest::Url;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::VideoArtifact;

pub use mp4::mvhd_duration_seconds;

const VIDEO_EXTENSION: &str = "mp4";
const METADATA_EXTENSION: &str = "json";
const PARTIAL_MARKER: &str = ".part-";
const MAX_SLUG_LEN: usize = 40;

/// Finished video on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVideo {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// From the MP4 movie header, when present.
    pub duration_seconds: Option<f64>,
}

/// Owns the artifact directory: atomic writes, metadata sidecars, cleanup.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    directory: PathBuf,
    retention: Option<Duration>,
    write_metadata: bool,
}

impl ArtifactStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            directory: config.directory.clone(),
            retention: config.retention,
            write_metadata: config.write_metadata,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// `<host-slug>-<url-hash8>-<job-id>.mp4`
    pub fn artifact_file_name(url: &Url, job_id: &str) -> String {
        format!("{}.{}", artifact_stem(url, job_id), VIDEO_EXTENSION)
    }

    pub fn metadata_path_for(video_path: &Path) -> PathBuf {
        video_path.with_extension(METADATA_EXTENSION)
    }

    /// Writes the video bytes under the name derived from `url` and `job_id`.
    /// The file appears only once fully written and synced; an existing file
    /// with the same name is never replaced.
    pub async fn persist(&self, url: &Url, job_id: &str, bytes: &[u8]) -> Result<StoredVideo> {
        if bytes.is_empty() {
            return Err(PipelineError::StorageError(format!("refusing to store empty video for job {}", job_id)));
        }

        let path = self.directory.join(Self::artifact_file_name(url, job_id));
        self.write_atomic(&path, bytes).await?;

        let stored = StoredVideo {
            size_bytes: bytes.len() as u64,
            duration_seconds: mvhd_duration_seconds(bytes),
            path,
        };
        info!("Stored video for job {} at {} ({} bytes)", job_id, stored.path.display(), stored.size_bytes);
        Ok(stored)
    }

    /// Path the sidecar for `video_path` will be written to, if enabled.
    pub fn planned_metadata_path(&self, video_path: &Path) -> Option<PathBuf> {
        self.write_metadata.then(|| Self::metadata_path_for(video_path))
    }

    /// Writes `artifact` as JSON to its `metadata_path`.
    pub async fn write_metadata(&self, artifact: &VideoArtifact) -> Result<()> {
        let Some(path) = &artifact.metadata_path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(artifact)?;
        self.write_atomic(path, &json).await?;
        debug!("Wrote metadata {}", path.display());
        Ok(())
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| PipelineError::StorageError(format!("Failed to create {}: {}", self.directory.display(), e)))?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PipelineError::StorageError(format!("Invalid artifact path {}", path.display())))?;
        let temp = self
            .directory
            .join(format!(".{}{}{}", file_name, PARTIAL_MARKER, Uuid::new_v4()));

        // removed on every exit, including a dropped future
        let partial = PartialFile(temp);
        write_synced(&partial.0, bytes).await?;
        publish(&partial.0, path).await
    }

    /// Deletes artifacts and sidecars older than the retention period.
    pub async fn prune_expired(&self) -> Result<usize> {
        let Some(retention) = self.retention else {
            return Ok(0);
        };
        let cutoff = SystemTime::now()
            .checked_sub(retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let removed = self
            .remove_matching(cutoff, |name| {
                !name.starts_with('.')
                    && (name.ends_with(&format!(".{}", VIDEO_EXTENSION))
                        || name.ends_with(&format!(".{}", METADATA_EXTENSION)))
            })
            .await?;
        if removed > 0 {
            info!("Pruned {} expired files from {}", removed, self.directory.display());
        }
        Ok(removed)
    }

    /// Deletes temporary files left behind by interrupted writes. Only files
    /// older than `min_age` are touched so concurrent writers are safe.
    pub async fn remove_stale_partials(&self, min_age: Duration) -> Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(min_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let removed = self
            .remove_matching(cutoff, |name| name.starts_with('.') && name.contains(PARTIAL_MARKER))
            .await?;
        if removed > 0 {
            info!("Removed {} stale partial files from {}", removed, self.directory.display());
        }
        Ok(removed)
    }

    async fn remove_matching<F>(&self, cutoff: SystemTime, matches: F) -> Result<usize>
    where
        F: Fn(&str) -> bool,
    {
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !matches(name) {
                continue;
            }

            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified()?;
            if modified >= cutoff {
                continue;
            }

            match fs::remove_file(entry.path()).await {
                Ok(()) => {
                    debug!("Removed {}", entry.path().display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove {}: {}", entry.path().display(), e),
            }
        }
        Ok(removed)
    }
}

/// Temporary file that is deleted when the guard goes out of scope.
struct PartialFile(PathBuf);

impl Drop for PartialFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != ErrorKind::NotFound {
                warn!("Could not remove temporary file {}: {}", self.0.display(), e);
            }
        }
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| PipelineError::StorageError(format!("Failed to create {}: {}", path.display(), e)))?;
    file.write_all(bytes)
        .await
        .map_err(|e| PipelineError::StorageError(format!("Failed to write {}: {}", path.display(), e)))?;
    file.sync_all()
        .await
        .map_err(|e| PipelineError::StorageError(format!("Failed to sync {}: {}", path.display(), e)))?;
    Ok(())
}

/// Links the finished temp file to its final name. Fails if the name is taken.
async fn publish(temp: &Path, path: &Path) -> Result<()> {
    match fs::hard_link(temp, path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(PipelineError::StorageError(format!(
            "{} already exists; artifacts are never overwritten",
            path.display()
        ))),
        Err(e) => {
            // filesystems without hard links
            debug!("hard_link failed ({}), falling back to rename", e);
            if fs::try_exists(path).await? {
                return Err(PipelineError::StorageError(format!(
                    "{} already exists; artifacts are never overwritten",
                    path.display()
                )));
            }
            fs::rename(temp, path)
                .await
                .map_err(|e| PipelineError::StorageError(format!("Failed to publish {}: {}", path.display(), e)))
        }
    }
}

fn artifact_stem(url: &Url, job_id: &str) -> String {
    let digest = Sha256::digest(url.as_str().as_bytes());
    let hash8: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}-{}", host_slug(url), hash8, sanitize(job_id, usize::MAX))
}

fn host_slug(url: &Url) -> String {
    let host = url.host_str().unwrap_or("");
    let host = host.strip_prefix("www.").unwrap_or(host);
    let slug = sanitize(&host.to_ascii_lowercase(), MAX_SLUG_LEN);
    if slug.is_empty() {
        "site".to_string()
    } else {
        slug
    }
}

/// ASCII alphanumerics and `_` kept, everything else collapsed to `-`.
fn sanitize(value: &str, max_len: usize) -> String {
    let mut out = String::new();
    for c in value.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
        if out.len() >= max_len {
            break;
        }
    }
    out.trim_end_matches('-').to_string()
}
