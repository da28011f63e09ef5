//! The job queue: an ordered collection of [`JobRecord`]s plus the id of
//! the record currently selected.
//!
//! The collection is copy-on-write. Readers take a [`RegistrySnapshot`]
//! (two `Arc` clones) and never block writers for longer than that. Every
//! mutation goes through a per-id read-modify-write under the write lock,
//! so concurrent updates to different records, or to different fields of
//! the same record, never overwrite each other. Writers replace only the
//! record they touch; the other records are shared with older snapshots.

use std::sync::Arc;

use tokio::sync::RwLock;
use veditor_core::error::CoreError;
use veditor_core::job::{JobPatch, JobRecord};
use veditor_core::media::{validate_extension, MediaFile, MediaKind};
use veditor_core::types::JobId;
use veditor_events::{EventBus, JobEvent};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// An immutable view of the queue at one point in time.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    records: Arc<Vec<Arc<JobRecord>>>,
    active: Option<JobId>,
}

impl RegistrySnapshot {
    /// Records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = &JobRecord> {
        self.records.iter().map(|r| r.as_ref())
    }

    pub fn get(&self, id: JobId) -> Option<&JobRecord> {
        self.records.iter().find(|r| r.id == id).map(|r| r.as_ref())
    }

    pub fn active(&self) -> Option<JobId> {
        self.active
    }

    pub fn active_record(&self) -> Option<&JobRecord> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn position(&self, id: JobId) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Shared job queue. Clone the surrounding `Arc` into every task.
pub struct JobRegistry {
    state: RwLock<RegistrySnapshot>,
    events: Arc<EventBus>,
}

impl JobRegistry {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            state: RwLock::new(RegistrySnapshot::default()),
            events,
        }
    }

    /// Current state of the whole queue.
    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.state.read().await.clone()
    }

    /// A copy of one record.
    pub async fn get(&self, id: JobId) -> Option<JobRecord> {
        self.state.read().await.get(id).cloned()
    }

    pub async fn active(&self) -> Option<JobId> {
        self.state.read().await.active
    }

    /// Append one idle record per file, in order.
    ///
    /// Every file is validated before anything is appended: a single
    /// unsupported file rejects the whole batch. The first new record
    /// becomes active when the queue was empty or `auto_select` is set.
    pub async fn insert(
        &self,
        files: Vec<MediaFile>,
        auto_select: bool,
    ) -> Result<Vec<JobId>, CoreError> {
        for file in &files {
            validate_extension(MediaKind::Video, file.file_name())?;
        }
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let new_records: Vec<JobRecord> = files.into_iter().map(JobRecord::new).collect();
        let ids: Vec<JobId> = new_records.iter().map(|r| r.id).collect();

        let mut state = self.state.write().await;
        let was_empty = state.records.is_empty();
        Arc::make_mut(&mut state.records).extend(new_records.into_iter().map(Arc::new));

        for id in &ids {
            tracing::debug!(job_id = %id, "Job inserted");
            self.events.publish(JobEvent::Inserted { job_id: *id });
        }

        if was_empty || auto_select {
            state.active = ids.first().copied();
            self.events.publish(JobEvent::ActiveChanged { job_id: state.active });
        }

        Ok(ids)
    }

    /// Make `id` the active record. Unknown ids are ignored.
    ///
    /// Returns whether the record exists.
    pub async fn select(&self, id: JobId) -> bool {
        let mut state = self.state.write().await;
        if state.position(id).is_none() {
            return false;
        }
        if state.active != Some(id) {
            state.active = Some(id);
            self.events.publish(JobEvent::ActiveChanged { job_id: Some(id) });
        }
        true
    }

    /// Merge `patch` into the record with this id.
    ///
    /// Unknown ids are a no-op and return `false`; this is the normal
    /// outcome for a late response about a removed record.
    pub async fn update(&self, id: JobId, patch: JobPatch) -> bool {
        self.modify(id, |record| patch.apply(record)).await.is_some()
    }

    /// Run `f` on the latest version of the record and commit the result.
    ///
    /// Returns `None` when no record has this id.
    pub async fn modify<T>(&self, id: JobId, f: impl FnOnce(&mut JobRecord) -> T) -> Option<T> {
        self.try_modify(id, |record| Ok::<T, std::convert::Infallible>(f(record)))
            .await
            .map(|result| match result {
                Ok(value) => value,
                Err(never) => match never {},
            })
    }

    /// Run `f` on the latest version of the record; commit only on `Ok`.
    ///
    /// An `Err` from `f` discards whatever it changed, so transition
    /// checks can bail out halfway without leaving a partial write.
    /// Returns `None` when no record has this id.
    pub async fn try_modify<T, E>(
        &self,
        id: JobId,
        f: impl FnOnce(&mut JobRecord) -> Result<T, E>,
    ) -> Option<Result<T, E>> {
        let mut state = self.state.write().await;
        let index = state.position(id)?;
        Some(self.commit(&mut state, index, f))
    }

    /// Apply `f` to the active record. `None` when nothing is selected.
    pub async fn try_modify_active<T, E>(
        &self,
        f: impl FnOnce(&mut JobRecord) -> Result<T, E>,
    ) -> Option<(JobId, Result<T, E>)> {
        // Resolve and modify under one lock so the selection cannot move
        // between the two steps.
        let mut state = self.state.write().await;
        let id = state.active?;
        let index = state.position(id)?;
        Some((id, self.commit(&mut state, index, f)))
    }

    /// Remove a record and return it.
    ///
    /// If it was active, the selection moves to the next record, else the
    /// previous one, else nothing.
    pub async fn remove(&self, id: JobId) -> Option<JobRecord> {
        let mut state = self.state.write().await;
        let index = state.position(id)?;

        let removed = Arc::make_mut(&mut state.records).remove(index);
        self.events.publish(JobEvent::Removed { job_id: id });

        if state.active == Some(id) {
            let next = state
                .records
                .get(index)
                .or_else(|| index.checked_sub(1).and_then(|i| state.records.get(i)))
                .map(|r| r.id);
            state.active = next;
            self.events.publish(JobEvent::ActiveChanged { job_id: next });
        }

        tracing::debug!(job_id = %id, "Job removed");
        Some(Arc::unwrap_or_clone(removed))
    }

    // ---- private helpers ----

    /// Copy the record at `index`, let `f` edit the copy, and swap it in.
    fn commit<T, E>(
        &self,
        state: &mut RegistrySnapshot,
        index: usize,
        f: impl FnOnce(&mut JobRecord) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut record = JobRecord::clone(&state.records[index]);
        let value = f(&mut record)?;
        record.touch();

        self.events.publish(JobEvent::Updated {
            job_id: record.id,
            status: record.status,
            progress: record.progress,
        });
        Arc::make_mut(&mut state.records)[index] = Arc::new(record);
        Ok(value)
    }
}
