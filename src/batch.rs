//! Size-bounded batch writer. Records are grouped per `(WriteKind, siteCode)`
//! and each group is submitted as one atomic batch against its partition.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::{IngestError, RegistryError, WriteKind};
use crate::model::Stream;
use crate::registry::{BatchOperation, StoreClient};

/// Byte threshold for one batch, kept below the transport's hard cap.
pub const DEFAULT_BATCH_SIZE_LIMIT: usize = 3_000_000;
/// Operation cap of one transactional batch on the store.
pub const DEFAULT_MAX_BATCH_OPERATIONS: usize = 100;

/// Status reported in an `ItemWrite` failure when the store returned fewer
/// results than operations.
pub const STATUS_MISSING: u16 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchLimits {
    pub size_limit: usize,
    pub max_operations: Option<usize>,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self { size_limit: DEFAULT_BATCH_SIZE_LIMIT, max_operations: Some(DEFAULT_MAX_BATCH_OPERATIONS) }
    }
}

#[derive(Default)]
struct Accumulator {
    // (input line, record)
    records: Vec<(Option<usize>, Stream)>,
    payloads: Vec<Vec<u8>>,
    size: usize,
}

/// A record that was not persisted, with the reason and the input line it
/// was queued from.
#[derive(Debug)]
pub struct WriteFailure {
    pub kind: WriteKind,
    pub line: Option<usize>,
    pub stream: Stream,
    pub error: IngestError,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// Held in the accumulator.
    Queued,
    /// The addition crossed a limit and the group was submitted.
    Flushed(FlushStats),
    /// Could not be serialized; recorded as a failure, siblings unaffected.
    Rejected,
}

pub struct BatchWriter<'a> {
    registry: &'a dyn StoreClient,
    limits: BatchLimits,
    // ordered so create groups drain before replace groups
    accumulators: BTreeMap<(WriteKind, String), Accumulator>,
    failures: Vec<WriteFailure>,
    submissions: usize,
    created: usize,
    replaced: usize,
}

impl<'a> BatchWriter<'a> {
    pub fn new(registry: &'a dyn StoreClient, limits: BatchLimits) -> Self {
        Self {
            registry,
            limits,
            accumulators: BTreeMap::new(),
            failures: Vec::new(),
            submissions: 0,
            created: 0,
            replaced: 0,
        }
    }

    /// Serialize `stream` and queue it under `(kind, stream.site_code)`.
    pub fn add(&mut self, kind: WriteKind, stream: Stream) -> AddOutcome {
        self.queue(None, kind, stream)
    }

    /// Like [`BatchWriter::add`], remembering the input line so a failure can
    /// be reported against it.
    pub fn add_from_line(&mut self, line: usize, kind: WriteKind, stream: Stream) -> AddOutcome {
        self.queue(Some(line), kind, stream)
    }

    fn queue(&mut self, line: Option<usize>, kind: WriteKind, stream: Stream) -> AddOutcome {
        let payload = match serde_json::to_vec(&stream) {
            Ok(p) => p,
            Err(source) => {
                let error =
                    IngestError::Serialization { sensor_id: stream.sensor_id.clone(), id: stream.id.clone(), source };
                warn!(sensor_id = %stream.sensor_id, error = %error, "record rejected");
                self.failures.push(WriteFailure { kind, line, stream, error });
                return AddOutcome::Rejected;
            }
        };

        let key = (kind, stream.site_code.clone());
        let acc = self.accumulators.entry(key.clone()).or_default();
        acc.size += payload.len();
        acc.payloads.push(payload);
        acc.records.push((line, stream));

        let over_size = acc.size > self.limits.size_limit;
        let over_count = self.limits.max_operations.is_some_and(|max| acc.records.len() >= max);
        if over_size || over_count {
            debug!(kind = %kind, site_code = %key.1, bytes = acc.size, ops = acc.records.len(), "limit reached");
            return AddOutcome::Flushed(self.flush(kind, &key.1));
        }
        AddOutcome::Queued
    }

    /// Submit the pending group for `(kind, site_code)` and clear it, whatever
    /// the result.
    pub fn flush(&mut self, kind: WriteKind, site_code: &str) -> FlushStats {
        let Some(acc) = self.accumulators.remove(&(kind, site_code.to_string())) else {
            return FlushStats::default();
        };
        if acc.records.is_empty() {
            return FlushStats::default();
        }

        let submitted = acc.records.len();
        self.submissions += 1;
        let response = {
            let ops: Vec<BatchOperation<'_>> = acc
                .records
                .iter()
                .zip(&acc.payloads)
                .map(|((_, s), p)| BatchOperation { kind, id: &s.id, payload: p })
                .collect();
            self.registry.submit_batch(site_code, &ops)
        };

        let mut stats = FlushStats { submitted, ..FlushStats::default() };
        match response {
            Ok(results) => {
                for (i, (line, stream)) in acc.records.into_iter().enumerate() {
                    match results.get(i) {
                        Some(r) if r.is_success() => stats.succeeded += 1,
                        other => {
                            let status = other.map_or(STATUS_MISSING, |r| r.status_code);
                            let error = IngestError::ItemWrite {
                                site_code: site_code.to_string(),
                                sensor_id: stream.sensor_id.clone(),
                                id: stream.id.clone(),
                                kind,
                                status,
                            };
                            warn!(index = i, error = %error, "batch item failed");
                            self.failures.push(WriteFailure { kind, line, stream, error });
                            stats.failed += 1;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(kind = %kind, site_code, records = submitted, error = %e, "batch submission failed");
                let reason = match e {
                    RegistryError::Transport(msg) => msg,
                    other => other.to_string(),
                };
                for (line, stream) in acc.records {
                    let error = IngestError::BatchSubmission {
                        site_code: site_code.to_string(),
                        kind,
                        source: RegistryError::Transport(reason.clone()),
                    };
                    self.failures.push(WriteFailure { kind, line, stream, error });
                }
                stats.failed = submitted;
            }
        }

        match kind {
            WriteKind::Create => self.created += stats.succeeded,
            WriteKind::Replace => self.replaced += stats.succeeded,
        }
        info!(
            kind = %kind,
            site_code,
            submitted = stats.submitted,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "batch flushed"
        );
        stats
    }

    /// Flush every pending group (creates first) and hand back every failure
    /// recorded since the writer was created.
    pub fn close_all(&mut self) -> Vec<WriteFailure> {
        let keys: Vec<(WriteKind, String)> = self.accumulators.keys().cloned().collect();
        for (kind, site) in keys {
            self.flush(kind, &site);
        }
        std::mem::take(&mut self.failures)
    }

    /// Records waiting in the `(kind, site_code)` group.
    pub fn pending_len(&self, kind: WriteKind, site_code: &str) -> usize {
        self.accumulators.get(&(kind, site_code.to_string())).map_or(0, |a| a.records.len())
    }

    /// Serialized bytes waiting in the `(kind, site_code)` group.
    pub fn pending_bytes(&self, kind: WriteKind, site_code: &str) -> usize {
        self.accumulators.get(&(kind, site_code.to_string())).map_or(0, |a| a.size)
    }

    pub fn submissions(&self) -> usize {
        self.submissions
    }

    pub fn created(&self) -> usize {
        self.created
    }

    pub fn replaced(&self) -> usize {
        self.replaced
    }
}
