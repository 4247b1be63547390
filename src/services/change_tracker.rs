// src/services/change_tracker.rs

use crate::models::{
    AuditTrail, ChangeMetadata, ChangeRecord, ChangeType, ConflictResolution, DiffFormat,
    DiffStats, HistoryPage, HistoryQuery, Resolution, ResolutionStrategy, RollbackOptions,
    RollbackResult, TrackerError, TrackerResult, Version,
};
use crate::services::content_source::ContentSource;
use crate::services::history_store::HistoryStore;
use crate::utils::version_control::diff_utils::{self, DiffHeader};
use crate::utils::version_control::{content_hash, count_lines, merge_utils};
use crate::utils::{validate_file_id, ChangeLog, FileLockRegistry, TrackerConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Uninitialized,
    Initializing,
    Ready,
}

// A detected conflict waiting for exactly one resolution
#[derive(Debug, Clone)]
struct PendingConflict {
    conflict: ConflictResolution,
    incoming_content: String,
}

pub struct ChangeTracker {
    config: TrackerConfig,
    store: Arc<HistoryStore>,
    change_log: ChangeLog,
    locks: FileLockRegistry,
    pending_conflicts: Mutex<HashMap<String, PendingConflict>>,
    ready: OnceCell<()>,
    initializing: AtomicBool,
}

impl ChangeTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_store(config, Arc::new(HistoryStore::new()))
    }

    pub fn with_store(config: TrackerConfig, store: Arc<HistoryStore>) -> Self {
        let change_log = ChangeLog::new(&config);
        ChangeTracker {
            config,
            store,
            change_log,
            locks: FileLockRegistry::new(),
            pending_conflicts: Mutex::new(HashMap::new()),
            ready: OnceCell::new(),
            initializing: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    pub fn state(&self) -> TrackerState {
        if self.ready.initialized() {
            TrackerState::Ready
        } else if self.initializing.load(Ordering::SeqCst) {
            TrackerState::Initializing
        } else {
            TrackerState::Uninitialized
        }
    }

    // Creates storage and loads every change log. Runs once; concurrent
    // callers wait for the first load instead of starting their own.
    pub async fn initialize(&self) -> TrackerResult<()> {
        self.ready
            .get_or_try_init(move || async move {
                self.initializing.store(true, Ordering::SeqCst);
                let result = self.load_history().await;
                self.initializing.store(false, Ordering::SeqCst);
                result
            })
            .await?;
        Ok(())
    }

    async fn load_history(&self) -> TrackerResult<()> {
        self.change_log.ensure_storage().await?;

        if self.config.enable_compression {
            warn!("Compression requested; change logs are stored as plain JSON");
        }

        let histories = self.change_log.load_all().await?;
        let files = histories.len();
        self.store.load(histories);

        info!(
            "Change tracker ready: {} files, {} records from {:?}",
            files,
            self.store.total_records(),
            self.change_log.changes_dir()
        );
        Ok(())
    }

    pub async fn record_change(
        &self,
        file_id: &str,
        change_type: ChangeType,
        content_before: &str,
        content_after: &str,
        description: Option<&str>,
        author: Option<&str>,
    ) -> TrackerResult<ChangeRecord> {
        self.initialize().await?;
        validate_file_id(file_id)?;

        let _guard = self.locks.acquire(file_id).await;
        self.record_change_locked(file_id, change_type, content_before, content_after, description, author)
            .await
    }

    // Caller must hold the file's write lock
    async fn record_change_locked(
        &self,
        file_id: &str,
        change_type: ChangeType,
        content_before: &str,
        content_after: &str,
        description: Option<&str>,
        author: Option<&str>,
    ) -> TrackerResult<ChangeRecord> {
        let mut history = self.store.snapshot(file_id);
        let version = history.iter().map(|r| r.version).max().map_or(1, |v| v + 1);

        let changes = if self.config.enable_diff {
            diff_utils::compute_changes(content_before, content_after, self.config.diff_algorithm)
        } else {
            Vec::new()
        };

        let description = match description.map(str::trim).filter(|d| !d.is_empty()) {
            Some(d) => d.to_string(),
            None => {
                let stats = DiffStats::from_changes(&changes);
                format!(
                    "{}: +{} -{} ~{}",
                    change_type.past_tense(),
                    stats.additions,
                    stats.deletions,
                    stats.modifications
                )
            }
        };

        let timestamp = Utc::now();
        let record = ChangeRecord {
            id: generate_change_id(file_id, content_after, timestamp),
            file_id: file_id.to_string(),
            version,
            timestamp,
            author: author.map(str::trim).filter(|a| !a.is_empty()).map(str::to_string),
            description,
            change_type,
            changes,
            metadata: build_metadata(content_before, content_after),
            content: content_after.to_string(),
        };

        history.push(record.clone());

        let cap = self.config.retention_cap();
        let overflow = history.len().saturating_sub(cap);
        let evicted: Vec<ChangeRecord> = history.drain(..overflow).collect();

        // Evicted records reach the archive before the log drops them. If the
        // log write then fails they exist in both places, and memory is unchanged.
        for old in &evicted {
            self.change_log.archive(old).await?;
        }
        self.change_log.write_log(file_id, &history).await?;
        self.store.replace(file_id, history);
        self.discard_pending_conflicts(file_id);

        info!(
            "Recorded {} change for file_id={} version={} ({})",
            record.change_type, file_id, record.version, record.description
        );
        Ok(record)
    }

    pub async fn get_change_history(&self, file_id: &str, query: &HistoryQuery) -> TrackerResult<HistoryPage> {
        self.initialize().await?;

        let mut filtered: Vec<ChangeRecord> = self
            .store
            .snapshot(file_id)
            .into_iter()
            .filter(|r| query.from_version.map_or(true, |from| r.version >= from))
            .filter(|r| query.to_version.map_or(true, |to| r.version <= to))
            .filter(|r| match &query.author {
                Some(author) => r.author.as_deref() == Some(author.as_str()),
                None => true,
            })
            .filter(|r| query.change_type.map_or(true, |t| r.change_type == t))
            .collect();

        // Most recent first
        filtered.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.version.cmp(&a.version))
        });

        let total = filtered.len();
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(total);
        let changes: Vec<ChangeRecord> = filtered.into_iter().skip(offset).take(limit).collect();
        let has_more = offset + changes.len() < total;

        Ok(HistoryPage {
            changes,
            total,
            has_more,
        })
    }

    pub async fn generate_diff(
        &self,
        file_id: &str,
        from_version: Version,
        to_version: Version,
        format: DiffFormat,
    ) -> TrackerResult<String> {
        self.initialize().await?;

        let from = self.find_version(file_id, from_version).await?;
        let to = self.find_version(file_id, to_version).await?;

        let rows = diff_utils::diff_rows(&from.content, &to.content, self.config.diff_algorithm);
        let header = DiffHeader {
            file_id,
            from_version,
            from_timestamp: from.timestamp,
            to_version,
            to_timestamp: to.timestamp,
        };

        debug!(
            "Rendering {:?} diff for file_id={} {}..{}",
            format, file_id, from_version, to_version
        );
        Ok(diff_utils::render_diff(format, &header, &rows))
    }

    // Rollback is an ordinary update from the current content to the target's content
    pub async fn rollback_to_version(&self, file_id: &str, options: &RollbackOptions) -> TrackerResult<RollbackResult> {
        self.initialize().await?;
        validate_file_id(file_id)?;

        let _guard = self.locks.acquire(file_id).await;

        let target = self.find_version(file_id, options.target_version).await?;
        let current = self
            .store
            .latest(file_id)
            .map(|r| r.content)
            .unwrap_or_default();

        let description = match options.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => format!("Rollback to v{}: {}", options.target_version, reason),
            None => format!("Rollback to version {}", options.target_version),
        };

        debug!(
            "Rollback file_id={} to version {} (preserve_changes={}, create_backup={})",
            file_id, options.target_version, options.preserve_changes, options.create_backup
        );

        let change_record = self
            .record_change_locked(file_id, ChangeType::Update, &current, &target.content, Some(description.as_str()), None)
            .await?;

        info!(
            "Rolled back file_id={} to version {} as version {}",
            file_id, options.target_version, change_record.version
        );

        Ok(RollbackResult {
            content: target.content,
            change_record,
        })
    }

    pub async fn detect_conflicts(
        &self,
        file_id: &str,
        base_version: Version,
        incoming_content: &str,
    ) -> TrackerResult<Option<ConflictResolution>> {
        self.initialize().await?;

        let current = self
            .store
            .latest(file_id)
            .ok_or_else(|| TrackerError::not_found(format!("No history for file {}", file_id)))?;

        if base_version == current.version {
            return Ok(None);
        }

        let base = self.find_version(file_id, base_version).await?;
        let algorithm = self.config.diff_algorithm;
        let current_changes = diff_utils::base_changes(&base.content, &current.content, algorithm);
        let incoming_changes = diff_utils::base_changes(&base.content, incoming_content, algorithm);

        if !diff_utils::changes_conflict(&current_changes, &incoming_changes) {
            debug!(
                "No overlapping edits for file_id={} base={} current={}",
                file_id, base_version, current.version
            );
            return Ok(None);
        }

        let now = Utc::now();
        let conflict = ConflictResolution {
            conflict_id: format!(
                "conflict_{}_{}_{}_{}",
                file_id,
                base_version,
                current.version,
                now.format("%Y%m%d%H%M%S%f")
            ),
            file_id: file_id.to_string(),
            base_version,
            conflicting_versions: vec![current.version],
            resolution: ResolutionStrategy::Manual,
            resolved_by: None,
            resolved_at: None,
            merged_content: None,
        };

        self.pending_conflicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                conflict.conflict_id.clone(),
                PendingConflict {
                    conflict: conflict.clone(),
                    incoming_content: incoming_content.to_string(),
                },
            );

        info!(
            "Conflict {} detected for file_id={} (base={}, current={})",
            conflict.conflict_id, file_id, base_version, current.version
        );
        Ok(Some(conflict))
    }

    // Conflicts detected against an older latest version are stale once a new one lands
    fn discard_pending_conflicts(&self, file_id: &str) {
        let mut pending = self
            .pending_conflicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = pending.len();
        pending.retain(|_, p| p.conflict.file_id != file_id);
        let dropped = before - pending.len();
        if dropped > 0 {
            debug!("Dropped {} stale pending conflict(s) for file_id={}", dropped, file_id);
        }
    }

    pub fn pending_conflict(&self, conflict_id: &str) -> Option<ConflictResolution> {
        self.pending_conflicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conflict_id)
            .map(|pending| pending.conflict.clone())
    }

    // Produces the resolved content and consumes the pending conflict
    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        resolution: Resolution,
        resolved_by: Option<&str>,
    ) -> TrackerResult<String> {
        self.initialize().await?;

        let pending = self
            .pending_conflicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conflict_id)
            .cloned()
            .ok_or_else(|| TrackerError::not_found(format!("Conflict {}", conflict_id)))?;
        let file_id = &pending.conflict.file_id;

        let content = match &resolution {
            Resolution::AcceptCurrent => self.latest_content(file_id),
            Resolution::AcceptIncoming { content } => content.clone(),
            Resolution::Merge => merge_utils::create_marked_merge(
                &self.latest_content(file_id),
                &pending.incoming_content,
                pending
                    .conflict
                    .conflicting_versions
                    .last()
                    .copied()
                    .unwrap_or(pending.conflict.base_version),
            ),
            Resolution::Manual { merged_content } => merged_content.clone(),
        };

        let consumed = self
            .pending_conflicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(conflict_id);
        if consumed.is_none() {
            return Err(TrackerError::not_found(format!("Conflict {} already resolved", conflict_id)));
        }

        info!(
            "Conflict {} resolved with {:?} by {} at {}",
            conflict_id,
            resolution.strategy(),
            resolved_by.unwrap_or("unknown"),
            Utc::now().to_rfc3339()
        );
        Ok(content)
    }

    pub async fn get_audit_trail(
        &self,
        file_id: &str,
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
    ) -> TrackerResult<AuditTrail> {
        self.initialize().await?;

        let mut timeline: Vec<ChangeRecord> = self
            .store
            .snapshot(file_id)
            .into_iter()
            .filter(|r| from_date.map_or(true, |from| r.timestamp >= from))
            .filter(|r| to_date.map_or(true, |to| r.timestamp <= to))
            .collect();

        // Chronological, oldest first
        timeline.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.version.cmp(&b.version))
        });

        let authors: BTreeSet<String> = timeline
            .iter()
            .filter_map(|r| r.author.clone())
            .filter(|a| !a.is_empty())
            .collect();

        let mut change_types: BTreeMap<ChangeType, usize> = BTreeMap::new();
        for record in &timeline {
            *change_types.entry(record.change_type).or_insert(0) += 1;
        }

        Ok(AuditTrail {
            file_id: file_id.to_string(),
            total_changes: timeline.len(),
            authors: authors.into_iter().collect(),
            change_types,
            timeline,
        })
    }

    // Records a delete: current content to empty
    pub async fn delete_document(&self, file_id: &str, author: Option<&str>) -> TrackerResult<ChangeRecord> {
        self.initialize().await?;
        validate_file_id(file_id)?;

        let _guard = self.locks.acquire(file_id).await;
        let current = self
            .store
            .latest(file_id)
            .ok_or_else(|| TrackerError::not_found(format!("No history for file {}", file_id)))?;

        self.record_change_locked(file_id, ChangeType::Delete, &current.content, "", None, author)
            .await
    }

    pub async fn archived_change(&self, file_id: &str, version: Version) -> TrackerResult<ChangeRecord> {
        self.initialize().await?;
        validate_file_id(file_id)?;

        self.change_log
            .read_archived(file_id, version)
            .await?
            .ok_or_else(|| {
                TrackerError::not_found(format!("Archived version {} of {}", version, file_id))
            })
    }

    // Active history first, then the archive
    async fn find_version(&self, file_id: &str, version: Version) -> TrackerResult<ChangeRecord> {
        if let Some(record) = self.store.find(file_id, version) {
            return Ok(record);
        }
        if validate_file_id(file_id).is_ok() {
            if let Some(record) = self.change_log.read_archived(file_id, version).await? {
                debug!("Serving version {} of {} from archive", version, file_id);
                return Ok(record);
            }
        }
        Err(TrackerError::not_found(format!("Version {} of {}", version, file_id)))
    }

    fn latest_content(&self, file_id: &str) -> String {
        self.store.latest(file_id).map(|r| r.content).unwrap_or_default()
    }
}

#[async_trait]
impl ContentSource for ChangeTracker {
    async fn current_content(&self, file_id: &str) -> TrackerResult<String> {
        self.initialize().await?;
        Ok(self.latest_content(file_id))
    }

    async fn content_at_version(&self, file_id: &str, version: Version) -> TrackerResult<String> {
        self.initialize().await?;
        self.find_version(file_id, version).await.map(|r| r.content)
    }
}

fn build_metadata(content_before: &str, content_after: &str) -> ChangeMetadata {
    ChangeMetadata {
        size_before: content_before.len(),
        size_after: content_after.len(),
        lines_before: count_lines(content_before),
        lines_after: count_lines(content_after),
        hash_before: (!content_before.is_empty()).then(|| content_hash(content_before)),
        hash_after: (!content_after.is_empty()).then(|| content_hash(content_after)),
    }
}

// Digest of file id, content, time and a random component
fn generate_change_id(file_id: &str, content: &str, timestamp: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_id.as_bytes());
    hasher.update(content.as_bytes());
    hasher.update(timestamp.to_rfc3339().as_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}
