//! Upload orchestrator: moves selected files into object storage.
//!
//! Each file gets a fresh key (never the user's filename), is uploaded
//! independently, and ends in `Done` or `Error`. One failed file never
//! aborts the batch; the caller decides what zero successes mean.

use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use adapt_shared::{DraftId, DraftUploadedFile, ObjectStorage, StorageError};

use crate::pipeline::ProgressReporter;
use crate::validator::file_extension;

// ---------------------------------------------------------------------------
// FileEntry
// ---------------------------------------------------------------------------

/// Transfer state of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Pending,
    Uploading,
    /// Stored under `remote_key`.
    Done { remote_key: String },
    Error { message: String },
}

/// One user-selected file awaiting or undergoing transfer.
///
/// Only the status changes after construction, and only through the
/// orchestrator's reducer.
#[derive(Debug, Clone)]
pub struct FileEntry {
    id: Uuid,
    name: String,
    mime_type: String,
    bytes: Bytes,
    status: FileStatus,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
            status: FileStatus::Pending,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Original filename, kept for display and the manifest only.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn status(&self) -> &FileStatus {
        &self.status
    }

    /// Set iff the status is `Done`.
    pub fn remote_key(&self) -> Option<&str> {
        match &self.status {
            FileStatus::Done { remote_key } => Some(remote_key),
            _ => None,
        }
    }

    /// Set iff the status is `Error`.
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            FileStatus::Error { message } => Some(message),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.status, FileStatus::Done { .. })
    }

    /// Forget the outcome of a previous attempt.
    pub(crate) fn reset(&mut self) {
        self.status = FileStatus::Pending;
    }

    fn uploaded_file(&self, namespace: &UploadNamespace) -> Option<DraftUploadedFile> {
        self.remote_key().map(|key| DraftUploadedFile {
            remote_key: key.to_string(),
            storage_path: namespace.object_path(key),
            original_name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size(),
        })
    }
}

// ---------------------------------------------------------------------------
// Namespace and keys
// ---------------------------------------------------------------------------

/// Storage prefix of one attempt: `{owner_id}/{draft_id}/files/`.
#[derive(Debug, Clone)]
pub struct UploadNamespace {
    pub owner_id: String,
    pub draft_id: DraftId,
}

impl UploadNamespace {
    pub fn new(owner_id: impl Into<String>, draft_id: DraftId) -> Self {
        Self {
            owner_id: owner_id.into(),
            draft_id,
        }
    }

    /// Full object path for `key`.
    pub fn object_path(&self, key: &str) -> String {
        format!("{}/{}/files/{key}", self.owner_id, self.draft_id)
    }
}

/// Fresh key keeping only the lower-cased extension of `original_name`.
pub fn remote_key_for(original_name: &str) -> String {
    format!("{}{}", Uuid::now_v7(), file_extension(original_name))
}

/// User-facing message for a failed put.
pub fn describe_storage_error(error: &StorageError, bucket: &str) -> String {
    match error {
        StorageError::PolicyDenied { .. } => {
            format!("no permission to upload: check the storage policies for bucket «{bucket}»")
        }
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Reducer
// ---------------------------------------------------------------------------

/// A status change for the entry at `index`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum UploadEvent {
    Started { index: usize },
    Succeeded { index: usize, remote_key: String },
    Failed { index: usize, message: String },
}

impl UploadEvent {
    fn index(&self) -> usize {
        match self {
            Self::Started { index }
            | Self::Succeeded { index, .. }
            | Self::Failed { index, .. } => *index,
        }
    }
}

/// The single place file statuses change.
fn apply(entries: &mut [FileEntry], event: UploadEvent) {
    let Some(entry) = entries.get_mut(event.index()) else {
        return;
    };
    entry.status = match event {
        UploadEvent::Started { .. } => FileStatus::Uploading,
        UploadEvent::Succeeded { remote_key, .. } => FileStatus::Done { remote_key },
        UploadEvent::Failed { message, .. } => FileStatus::Error { message },
    };
}

// ---------------------------------------------------------------------------
// UploadOrchestrator
// ---------------------------------------------------------------------------

type PutOutcome = (usize, String, std::result::Result<(), StorageError>);

/// Uploads a batch of entries with bounded concurrency.
pub struct UploadOrchestrator {
    storage: Arc<dyn ObjectStorage>,
    concurrency: usize,
}

impl UploadOrchestrator {
    /// `concurrency` is clamped to at least 1.
    pub fn new(storage: Arc<dyn ObjectStorage>, concurrency: usize) -> Self {
        Self {
            storage,
            concurrency: concurrency.max(1),
        }
    }

    /// Upload every `Pending` entry under `namespace`.
    ///
    /// `cancel` is checked before each file starts; transfers already in
    /// flight are awaited, never aborted. Returns the files that reached
    /// `Done`, in input order.
    #[instrument(skip_all, fields(draft_id = %namespace.draft_id, files = entries.len()))]
    pub async fn upload_all(
        &self,
        entries: &mut [FileEntry],
        namespace: &UploadNamespace,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Vec<DraftUploadedFile> {
        let total = entries.len();
        let bucket = self.storage.bucket().to_string();
        let mut in_flight: JoinSet<PutOutcome> = JoinSet::new();
        let mut next = 0;
        let mut stopped = false;

        loop {
            while !stopped && in_flight.len() < self.concurrency && next < total {
                if cancel.is_cancelled() {
                    info!(started = next, total, "upload cancelled, remaining files not started");
                    stopped = true;
                    break;
                }

                let index = next;
                next += 1;
                if entries[index].status != FileStatus::Pending {
                    continue;
                }

                let entry = &entries[index];
                let remote_key = remote_key_for(entry.name());
                let path = namespace.object_path(&remote_key);
                let body = entry.bytes.clone();
                let content_type = entry.mime_type.clone();

                debug!(file = %entry.name(), %path, "starting upload");
                progress.file_started(entry.name(), index + 1, total);
                apply(entries, UploadEvent::Started { index });

                let storage = Arc::clone(&self.storage);
                in_flight.spawn(async move {
                    let result = storage.put(&path, body, &content_type).await;
                    (index, remote_key, result)
                });
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };

            let event = match joined {
                Ok((index, remote_key, Ok(()))) => UploadEvent::Succeeded { index, remote_key },
                Ok((index, _, Err(e))) => {
                    warn!(file = %entries[index].name(), error = %e, "upload failed");
                    UploadEvent::Failed {
                        index,
                        message: describe_storage_error(&e, &bucket),
                    }
                }
                Err(e) => {
                    // The entry is found by the sweep below.
                    warn!(error = %e, "upload task did not complete");
                    continue;
                }
            };

            let index = event.index();
            apply(entries, event);
            progress.file_finished(&entries[index]);
        }

        // A task that panicked leaves its entry stuck in `Uploading`.
        for index in 0..total {
            if entries[index].status == FileStatus::Uploading {
                apply(
                    entries,
                    UploadEvent::Failed {
                        index,
                        message: "upload task failed unexpectedly".into(),
                    },
                );
                progress.file_finished(&entries[index]);
            }
        }

        let uploaded: Vec<DraftUploadedFile> = entries
            .iter()
            .filter_map(|e| e.uploaded_file(namespace))
            .collect();

        info!(
            uploaded = uploaded.len(),
            failed = entries.iter().filter(|e| e.error().is_some()).count(),
            total,
            "upload batch finished"
        );

        uploaded
    }
}
