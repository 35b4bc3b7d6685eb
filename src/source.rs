//! The content API seam.
//!
//! [`ContentSource`] is everything the tree needs from the CMS: versioned reads and writes of
//! entries, entry creation and publishing, and asset lookup. [`MemorySource`] implements it in
//! memory with the same optimistic-concurrency contract the real API enforces, plus knobs for
//! injected failures and latency.

use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use crate::{
    error::ReftreeError,
    locator::EntryLocator,
    properties::{AssetRecord, FieldStatus, Fields, ResolvedEntry},
};

pub trait ContentSource: Sync {
    fn get_entry(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<ResolvedEntry, ReftreeError>> + Send;

    /// Look up an entry addressed by a resource locator.
    ///
    /// Default implementation ignores the space and looks the entry id up directly.
    fn get_entry_at(
        &self,
        locator: &EntryLocator,
    ) -> impl Future<Output = Result<ResolvedEntry, ReftreeError>> + Send {
        self.get_entry(&locator.entry_id)
    }

    /// Replace an entry's fields. `version` must equal the server's current version, otherwise
    /// the write fails with [`ReftreeError::Conflict`].
    fn update_entry(
        &self,
        id: &str,
        version: u64,
        fields: &Fields,
    ) -> impl Future<Output = Result<ResolvedEntry, ReftreeError>> + Send;

    fn create_entry(
        &self,
        content_type: &str,
        fields: &Fields,
    ) -> impl Future<Output = Result<ResolvedEntry, ReftreeError>> + Send;

    fn publish_entry(
        &self,
        id: &str,
        version: u64,
    ) -> impl Future<Output = Result<ResolvedEntry, ReftreeError>> + Send;

    fn get_asset(&self, id: &str)
        -> impl Future<Output = Result<AssetRecord, ReftreeError>> + Send;
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<String, ResolvedEntry>,
    assets: BTreeMap<String, AssetRecord>,
    read_failures: HashMap<String, ReftreeError>,
    write_failures: HashMap<String, ReftreeError>,
    requests: Vec<String>,
    writes: Vec<String>,
    next_id: usize,
}

/// In-memory [`ContentSource`].
#[derive(Debug)]
pub struct MemorySource {
    locale: String,
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemorySource {
    pub fn new<L: Into<String>>(locale: L) -> Self {
        MemorySource {
            locale: locale.into(),
            state: Mutex::new(MemoryState::default()),
            latency: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Every read suspends for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, mut entry: ResolvedEntry) {
        entry.refresh_links(&self.locale);
        self.state.lock().entries.insert(entry.id.clone(), entry);
    }

    pub fn insert_asset(&self, asset: AssetRecord) {
        self.state.lock().assets.insert(asset.id.clone(), asset);
    }

    /// Make every read of `id` fail with `error`.
    pub fn fail_reads(&self, id: &str, error: ReftreeError) {
        self.state.lock().read_failures.insert(id.to_string(), error);
    }

    /// Make every write to `id` fail with `error`.
    pub fn fail_writes(&self, id: &str, error: ReftreeError) {
        self.state.lock().write_failures.insert(id.to_string(), error);
    }

    /// Snapshot of a stored entry, bypassing request accounting.
    pub fn peek(&self, id: &str) -> Option<ResolvedEntry> {
        self.state.lock().entries.get(id).cloned()
    }

    /// Ids passed to entry reads, in call order.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().requests.clone()
    }

    /// Ids of successful writes (updates, creates, publishes), in call order.
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().writes.clone()
    }

    /// Highest number of reads observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        let mut state = self.state.lock();
        state.requests.clear();
        state.writes.clear();
        self.max_in_flight.store(0, Ordering::SeqCst);
    }

    async fn suspend(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn check_write(&self, state: &MemoryState, id: &str) -> Result<(), ReftreeError> {
        match state.write_failures.get(id) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

impl ContentSource for MemorySource {
    async fn get_entry(&self, id: &str) -> Result<ResolvedEntry, ReftreeError> {
        self.state.lock().requests.push(id.to_string());
        self.suspend().await;
        let state = self.state.lock();
        if let Some(e) = state.read_failures.get(id) {
            return Err(e.clone());
        }
        state
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| ReftreeError::NotFound(format!("entry {id}")))
    }

    async fn update_entry(
        &self,
        id: &str,
        version: u64,
        fields: &Fields,
    ) -> Result<ResolvedEntry, ReftreeError> {
        let mut state = self.state.lock();
        self.check_write(&state, id)?;
        let entry = state
            .entries
            .get_mut(id)
            .ok_or_else(|| ReftreeError::NotFound(format!("entry {id}")))?;
        if entry.version != version {
            return Err(ReftreeError::Conflict {
                id: id.to_string(),
                expected: version,
            });
        }
        entry.fields = fields.clone();
        entry.version += 1;
        if entry.field_status == FieldStatus::Published {
            entry.field_status = FieldStatus::Changed;
        }
        entry.refresh_links(&self.locale);
        let updated = entry.clone();
        state.writes.push(id.to_string());
        Ok(updated)
    }

    async fn create_entry(
        &self,
        content_type: &str,
        fields: &Fields,
    ) -> Result<ResolvedEntry, ReftreeError> {
        let mut state = self.state.lock();
        self.check_write(&state, content_type)?;
        state.next_id += 1;
        let id = format!("{content_type}-{}", state.next_id);
        let mut entry = ResolvedEntry::new(id.clone(), content_type);
        entry.fields = fields.clone();
        entry.refresh_links(&self.locale);
        state.entries.insert(id.clone(), entry.clone());
        state.writes.push(id);
        Ok(entry)
    }

    async fn publish_entry(&self, id: &str, version: u64) -> Result<ResolvedEntry, ReftreeError> {
        let mut state = self.state.lock();
        self.check_write(&state, id)?;
        let entry = state
            .entries
            .get_mut(id)
            .ok_or_else(|| ReftreeError::NotFound(format!("entry {id}")))?;
        if entry.version != version {
            return Err(ReftreeError::Conflict {
                id: id.to_string(),
                expected: version,
            });
        }
        entry.version += 1;
        entry.field_status = FieldStatus::Published;
        let published = entry.clone();
        state.writes.push(id.to_string());
        Ok(published)
    }

    async fn get_asset(&self, id: &str) -> Result<AssetRecord, ReftreeError> {
        self.suspend().await;
        self.state
            .lock()
            .assets
            .get(id)
            .cloned()
            .ok_or_else(|| ReftreeError::NotFound(format!("asset {id}")))
    }
}
