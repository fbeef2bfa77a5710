mod config;
mod date;
mod error;
mod model;
mod schema;
mod parser;
mod csv_io;
mod util;
mod progress;
mod ndjson;

mod registry;
mod file_registry;
mod reconcile;
mod batch;
mod report;
mod pipeline;

pub use crate::config::IngestOptions;
pub use crate::date::{file_stamp, format_utc, parse_utc, stamp_after};
pub use crate::error::{IngestError, RegistryError, WriteKind};
pub use crate::model::{
    tags_match, union_tags, AuditStamp, Item, Stream, Tag, TagMatch, UpdatePolicy, COMPARABLE_FIELDS,
    PRESERVED_ON_UPDATE,
};
pub use crate::pipeline::{CheckSummary, IngestSummary, StreamIngest, VerifySummary};

// Row parsing and the CSV boundary.
pub use crate::schema::{column_role, is_known_process, validate_header, ColumnRole, EXPECTED_HEADERS, KNOWN_PROCESS_CODES};
pub use crate::parser::{
    extra_tag_columns, item_to_row, item_to_stream, parse_item, parse_row, stream_to_item, RowFailure,
};
pub use crate::csv_io::{count_data_rows, CorrectionFile, CsvRowSource, RejectedRow};

// Reconciliation, batching and reporting engines.
pub use crate::reconcile::{
    reconcile, DuplicateTracker, LineOutcome, LogEntry, LogLevel, Outcome, PendingWrite, Reconciler, Reconciliation,
    Tally, UnresolvedRecord,
};
pub use crate::batch::{
    AddOutcome, BatchLimits, BatchWriter, FlushStats, WriteFailure, DEFAULT_BATCH_SIZE_LIMIT,
    DEFAULT_MAX_BATCH_OPERATIONS, STATUS_MISSING,
};
pub use crate::report::{finish_report, LogSink, TracingSink, VecSink};

// Registry backends.
pub use crate::registry::{
    BatchOperation, MemoryRegistry, OperationResult, StoreClient, Submission, STATUS_BAD_REQUEST, STATUS_CONFLICT,
    STATUS_CREATED, STATUS_FAILED_DEPENDENCY, STATUS_NOT_FOUND, STATUS_OK,
};
pub use crate::file_registry::FileRegistry;

pub use crate::progress::ProgressScope;

//export robust file ops and NDJSON helpers so binaries can import from crate root.
pub use crate::util::{create_with_backoff, init_tracing_once, open_with_backoff, remove_with_backoff, replace_file_atomic_backoff};
pub use crate::ndjson::{read_documents, NdjsonReader, NdjsonWriter};
