//! Persisted watermark.
//!
//! Written after every committed pass so a restart resumes where the last
//! process stopped instead of falling back to the configured seed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use smw_reconcile::TimeWatermark;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkState {
    pub watermark: TimeWatermark,
    #[serde(with = "smw_reconcile::time::serde_ts")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct WatermarkStateFile {
    path: PathBuf,
}

impl WatermarkStateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no state has been written yet.
    pub async fn load(&self) -> Result<Option<WatermarkState>> {
        let data = match fs::read(&self.path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read {:?}", self.path)),
        };
        let state = serde_json::from_slice(&data)
            .with_context(|| format!("decode watermark state {:?}", self.path))?;
        Ok(Some(state))
    }

    /// Write to a sibling temp file, then rename over the target. A crash
    /// mid-write leaves the previous state intact.
    pub async fn save(&self, watermark: TimeWatermark) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create_dir_all {:?}", parent))?;
        }
        let state = WatermarkState {
            watermark,
            updated_at: Utc::now(),
        };
        let data = serde_json::to_vec_pretty(&state).context("serialize watermark state")?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, data)
            .await
            .with_context(|| format!("write {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("rename {:?} -> {:?}", tmp, self.path))?;
        Ok(())
    }
}
