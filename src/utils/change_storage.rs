use crate::models::{ChangeRecord, TrackerResult, Version};
use crate::utils::config::TrackerConfig;
use futures::future::join_all;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

const LOG_SUFFIX: &str = "_changes.json";

// Append-only JSON change logs, one array per file, plus archived records
#[derive(Debug, Clone)]
pub struct ChangeLog {
    changes_dir: PathBuf,
    archive_dir: PathBuf,
}

impl ChangeLog {
    pub fn new(config: &TrackerConfig) -> Self {
        ChangeLog {
            changes_dir: config.changes_path(),
            archive_dir: config.archive_path(),
        }
    }

    pub fn changes_dir(&self) -> &Path {
        &self.changes_dir
    }

    // Creates the changes and archive directories if missing
    pub async fn ensure_storage(&self) -> TrackerResult<()> {
        if fs::metadata(&self.archive_dir).await.is_err() {
            info!("Creating change storage directory: {:?}", self.archive_dir);
        }
        fs::create_dir_all(&self.archive_dir).await?;
        Ok(())
    }

    pub fn log_path(&self, file_id: &str) -> PathBuf {
        self.changes_dir.join(format!("{}{}", file_id, LOG_SUFFIX))
    }

    pub fn archive_path(&self, file_id: &str, version: Version) -> PathBuf {
        self.archive_dir.join(format!("{}_{}.json", file_id, version))
    }

    // Loads every change log, grouped by the records' own file id.
    // A corrupt or unreadable log is skipped with a warning.
    pub async fn load_all(&self) -> TrackerResult<HashMap<String, Vec<ChangeRecord>>> {
        let mut paths = Vec::new();
        let mut entries = fs::read_dir(&self.changes_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file && path.extension().map_or(false, |ext| ext == "json") {
                paths.push(path);
            }
        }

        let loaded = join_all(paths.iter().map(|path| read_records(path))).await;

        let mut histories: HashMap<String, Vec<ChangeRecord>> = HashMap::new();
        for (path, result) in paths.iter().zip(loaded) {
            match result {
                Ok(records) => {
                    debug!("Loaded {} change records from {:?}", records.len(), path);
                    for record in records {
                        histories.entry(record.file_id.clone()).or_default().push(record);
                    }
                }
                Err(e) => warn!("Skipping unreadable change log {:?}: {}", path, e),
            }
        }

        for records in histories.values_mut() {
            records.sort_by_key(|r| r.version);
            records.dedup_by_key(|r| r.version);
        }

        Ok(histories)
    }

    // Current on-disk history for one file; empty when no log exists
    pub async fn read_log(&self, file_id: &str) -> TrackerResult<Vec<ChangeRecord>> {
        let path = self.log_path(file_id);
        match read_records(&path).await {
            Ok(records) => Ok(records),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    // Rewrites the whole per-file array; the rename keeps readers from seeing a partial file
    pub async fn write_log(&self, file_id: &str, records: &[ChangeRecord]) -> TrackerResult<()> {
        let path = self.log_path(file_id);
        let body = serde_json::to_string_pretty(records)?;
        write_atomically(&path, body.as_bytes()).await?;
        debug!("Persisted {} change records to {:?}", records.len(), path);
        Ok(())
    }

    pub async fn archive(&self, record: &ChangeRecord) -> TrackerResult<()> {
        let path = self.archive_path(&record.file_id, record.version);
        let body = serde_json::to_string_pretty(record)?;
        write_atomically(&path, body.as_bytes()).await?;
        info!(
            "Archived change file_id={} version={} to {:?}",
            record.file_id, record.version, path
        );
        Ok(())
    }

    pub async fn read_archived(&self, file_id: &str, version: Version) -> TrackerResult<Option<ChangeRecord>> {
        let path = self.archive_path(file_id, version);
        match fs::read_to_string(&path).await {
            Ok(body) => Ok(Some(serde_json::from_str(&body)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

async fn read_records(path: &Path) -> io::Result<Vec<ChangeRecord>> {
    let body = fs::read_to_string(path).await?;
    serde_json::from_str(&body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn write_atomically(path: &Path, body: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, body).await?;
    fs::rename(&tmp, path).await
}
