//! Export collaborator: turns a set of agents into a downloadable artifact

use crate::agent::Agent;
use crate::{FleetError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Write one artifact for `agents`, returning where it went
    async fn export(&self, agents: &[Agent]) -> Result<PathBuf>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument<'a> {
    exported_at: DateTime<Utc>,
    count: usize,
    agents: &'a [Agent],
}

/// Writes pretty-printed JSON files into a directory
pub struct JsonFileExporter {
    dir: PathBuf,
}

impl JsonFileExporter {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn file_name(at: DateTime<Utc>) -> String {
        format!(
            "fleetdeck-export-{}-{:04x}.json",
            at.format("%Y%m%d-%H%M%S"),
            rand::random::<u16>()
        )
    }
}

#[async_trait]
impl ExportSink for JsonFileExporter {
    async fn export(&self, agents: &[Agent]) -> Result<PathBuf> {
        let now = Utc::now();
        let doc = ExportDocument {
            exported_at: now,
            count: agents.len(),
            agents,
        };
        let body = serde_json::to_vec_pretty(&doc)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| FleetError::Export(format!("cannot create {}: {}", self.dir.display(), e)))?;
        let path = self.dir.join(Self::file_name(now));
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| FleetError::Export(format!("cannot write {}: {}", path.display(), e)))?;
        Ok(path)
    }
}
