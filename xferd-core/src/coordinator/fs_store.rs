//! Filesystem liveness store
//!
//! One JSON file per node in a shared directory. Writes go to a temp file
//! and are renamed into place, so readers never observe a torn beacon.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, info, warn};

use super::membership::{LivenessStore, NodeBeacon, NodeId};
use crate::error::{Result, XferdError};

const BEACON_EXT: &str = "json";

pub struct FsLivenessStore {
    dir: PathBuf,
}

impl FsLivenessStore {
    /// Open the store, creating `dir` if missing
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(XferdError::store)?;
        info!(dir = %dir.display(), "Liveness store opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn beacon_path(&self, node: &NodeId) -> PathBuf {
        // Hostnames contain dots, so the extension is appended, not set
        self.dir.join(format!(
            "{}__{}.{BEACON_EXT}",
            sanitize(&node.hostname),
            sanitize(&node.service_name)
        ))
    }

    async fn read_beacon(path: &Path) -> Result<NodeBeacon> {
        let raw = fs::read(path).await.map_err(XferdError::store)?;
        serde_json::from_slice(&raw).map_err(|e| XferdError::CorruptBeacon {
            key: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    async fn beacon_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(&self.dir).await.map_err(XferdError::store)?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(XferdError::store)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(BEACON_EXT) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

#[async_trait]
impl LivenessStore for FsLivenessStore {
    async fn put(&self, beacon: NodeBeacon) -> Result<()> {
        let path = self.beacon_path(&beacon.node);
        let tmp = path.with_extension(format!("{BEACON_EXT}.tmp"));
        let body = serde_json::to_vec(&beacon)?;

        fs::write(&tmp, body).await.map_err(XferdError::store)?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                debug!(path = %tmp.display(), error = %cleanup, "Temp beacon not removed");
            }
            return Err(XferdError::store(e));
        }
        debug!(node = %beacon.node, path = %path.display(), "Beacon written");
        Ok(())
    }

    async fn list_beacons(&self) -> Result<Vec<NodeBeacon>> {
        let mut beacons = Vec::new();
        for path in self.beacon_files().await? {
            match Self::read_beacon(&path).await {
                Ok(beacon) => beacons.push(beacon),
                Err(e) if !e.is_retryable() => {
                    warn!(error = %e, "Skipping unreadable beacon");
                }
                Err(e) => {
                    // Removed between listing and reading
                    if !fs::try_exists(&path).await.unwrap_or(true) {
                        continue;
                    }
                    return Err(e);
                }
            }
        }
        Ok(beacons)
    }

    async fn remove(&self, node: &NodeId) -> Result<bool> {
        match fs::remove_file(self.beacon_path(node)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(XferdError::store(e)),
        }
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut purged = 0;
        for beacon in self.list_beacons().await? {
            if beacon.last_seen < cutoff && self.remove(&beacon.node).await? {
                info!(node = %beacon.node, last_seen = %beacon.last_seen, "Purged stale beacon");
                purged += 1;
            }
        }
        Ok(purged)
    }
}
