//! Store-client contract for the stream registry, plus an in-process
//! implementation used by tests and dry runs.

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;

use crate::error::{RegistryError, WriteKind};
use crate::model::Stream;

pub const STATUS_OK: u16 = 200;
pub const STATUS_CREATED: u16 = 201;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_CONFLICT: u16 = 409;
pub const STATUS_FAILED_DEPENDENCY: u16 = 424;

/// One sub-operation of an atomic batch. `payload` is the serialized record.
#[derive(Clone, Copy, Debug)]
pub struct BatchOperation<'a> {
    pub kind: WriteKind,
    pub id: &'a str,
    pub payload: &'a [u8],
}

/// Per-operation outcome, aligned index-for-index with the submitted batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationResult {
    pub status_code: u16,
}

impl OperationResult {
    pub fn new(status_code: u16) -> Self {
        Self { status_code }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status_code, STATUS_OK | STATUS_CREATED)
    }
}

/// Blocking request/response access to the registry. All operations on a
/// record use its `site_code` as partition key.
pub trait StoreClient {
    /// Records matching `(sensor_id, site_code)`. Not-found is an empty list;
    /// errors are reserved for transport or decoding failures.
    fn find(&self, sensor_id: &str, site_code: &str) -> Result<Vec<Stream>, RegistryError>;

    /// Execute one batch against a single partition.
    fn submit_batch(
        &self,
        partition_key: &str,
        ops: &[BatchOperation<'_>],
    ) -> Result<Vec<OperationResult>, RegistryError>;
}

/// Apply one operation to an in-memory partition. Shared by both registry
/// implementations so they agree on status codes.
pub(crate) fn apply_operation(
    partition: &mut Vec<Stream>,
    partition_key: &str,
    op: &BatchOperation<'_>,
) -> OperationResult {
    let doc: Stream = match serde_json::from_slice(op.payload) {
        Ok(doc) => doc,
        Err(_) => return OperationResult::new(STATUS_BAD_REQUEST),
    };
    if doc.site_code != partition_key || doc.id != op.id {
        return OperationResult::new(STATUS_BAD_REQUEST);
    }
    let existing = partition.iter().position(|s| s.id == doc.id);
    match (op.kind, existing) {
        (WriteKind::Create, Some(_)) => OperationResult::new(STATUS_CONFLICT),
        (WriteKind::Create, None) => {
            partition.push(doc);
            OperationResult::new(STATUS_CREATED)
        }
        (WriteKind::Replace, Some(i)) => {
            partition[i] = doc;
            OperationResult::new(STATUS_OK)
        }
        (WriteKind::Replace, None) => OperationResult::new(STATUS_NOT_FOUND),
    }
}

/// Record of one `submit_batch` call, kept for inspection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub partition_key: String,
    pub kinds: Vec<WriteKind>,
    pub ids: Vec<String>,
}

#[derive(Default)]
struct MemoryState {
    partitions: AHashMap<String, Vec<Stream>>,
    failing_lookups: AHashSet<String>,
    failing_partitions: AHashSet<String>,
    status_overrides: AHashMap<String, u16>,
    submissions: Vec<Submission>,
    lookups: usize,
}

/// In-process registry with fault injection. Operations inside a batch are
/// applied independently; use `FileRegistry` for all-or-nothing batches.
#[derive(Default)]
pub struct MemoryRegistry {
    state: Mutex<MemoryState>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = Stream>) -> Self {
        let reg = Self::new();
        for r in records {
            reg.insert(r);
        }
        reg
    }

    /// Store a record as-is, bypassing batch semantics (duplicates allowed).
    pub fn insert(&self, record: Stream) {
        self.state.lock().partitions.entry(record.site_code.clone()).or_default().push(record);
    }

    pub fn get(&self, site_code: &str, id: &str) -> Option<Stream> {
        let st = self.state.lock();
        st.partitions.get(site_code)?.iter().find(|s| s.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().partitions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every lookup of `sensor_id` fail with a transport error.
    pub fn fail_lookups_for(&self, sensor_id: impl Into<String>) {
        self.state.lock().failing_lookups.insert(sensor_id.into());
    }

    /// Make every batch submitted to `partition_key` fail as a whole.
    pub fn fail_batches_for(&self, partition_key: impl Into<String>) {
        self.state.lock().failing_partitions.insert(partition_key.into());
    }

    /// Answer any operation on record `id` with `status` instead of applying it.
    pub fn override_status(&self, id: impl Into<String>, status: u16) {
        self.state.lock().status_overrides.insert(id.into(), status);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submissions.clone()
    }

    pub fn lookup_count(&self) -> usize {
        self.state.lock().lookups
    }
}

impl StoreClient for MemoryRegistry {
    fn find(&self, sensor_id: &str, site_code: &str) -> Result<Vec<Stream>, RegistryError> {
        let mut st = self.state.lock();
        st.lookups += 1;
        if st.failing_lookups.contains(sensor_id) {
            return Err(RegistryError::Transport(format!("lookup of '{sensor_id}' refused")));
        }
        Ok(st
            .partitions
            .get(site_code)
            .map(|p| p.iter().filter(|s| s.sensor_id == sensor_id).cloned().collect())
            .unwrap_or_default())
    }

    fn submit_batch(
        &self,
        partition_key: &str,
        ops: &[BatchOperation<'_>],
    ) -> Result<Vec<OperationResult>, RegistryError> {
        let mut st = self.state.lock();
        st.submissions.push(Submission {
            partition_key: partition_key.to_string(),
            kinds: ops.iter().map(|op| op.kind).collect(),
            ids: ops.iter().map(|op| op.id.to_string()).collect(),
        });
        if st.failing_partitions.contains(partition_key) {
            return Err(RegistryError::Transport(format!("batch for '{partition_key}' refused")));
        }

        let MemoryState { partitions, status_overrides, .. } = &mut *st;
        let partition = partitions.entry(partition_key.to_string()).or_default();
        Ok(ops
            .iter()
            .map(|op| match status_overrides.get(op.id) {
                Some(&status) => OperationResult::new(status),
                None => apply_operation(partition, partition_key, op),
            })
            .collect())
    }
}
