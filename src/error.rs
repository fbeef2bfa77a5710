use std::io;

use thiserror::Error;

/// Failures raised by a registry client.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry transport failure: {0}")]
    Transport(String),
    #[error("registry document is malformed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Which kind of write a batch carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WriteKind {
    Create,
    Replace,
}

impl std::fmt::Display for WriteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteKind::Create => f.write_str("create"),
            WriteKind::Replace => f.write_str("replace"),
        }
    }
}

/// Every anomaly the ingest core can report. Schema and I/O variants are fatal
/// for a run; the others are recovered per row or per record.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unexpected header in column {column}: got '{found}', want '{expected}'")]
    SchemaMismatch { column: usize, expected: String, found: String },

    #[error("missing header columns: got {found}, want at least {expected}")]
    MissingColumns { expected: usize, found: usize },

    #[error("line {line}: {reason}")]
    RowParse { line: usize, reason: String },

    #[error("line {line}: duplicate SensorID '{sensor_id}' (first seen on line {first_line})")]
    DuplicateKey { line: usize, first_line: usize, sensor_id: String },

    #[error("line {line}: registry lookup failed for sensor '{sensor_id}' at site '{site_code}': {source}")]
    RegistryLookup {
        line: usize,
        sensor_id: String,
        site_code: String,
        #[source]
        source: RegistryError,
    },

    #[error("line {line}: sensor '{sensor_id}' appears {matches} times in the registry for site '{site_code}'")]
    RegistryAmbiguity { line: usize, sensor_id: String, site_code: String, matches: usize },

    #[error("cannot encode stream '{sensor_id}' ({id}): {source}")]
    Serialization {
        sensor_id: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} batch for site '{site_code}' failed: {source}")]
    BatchSubmission {
        site_code: String,
        kind: WriteKind,
        #[source]
        source: RegistryError,
    },

    #[error("{kind} of stream '{sensor_id}' ({id}) at site '{site_code}' returned status {status}")]
    ItemWrite { site_code: String, sensor_id: String, id: String, kind: WriteKind, status: u16 },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl IngestError {
    /// Input line the error refers to, when it is tied to one.
    pub fn line(&self) -> Option<usize> {
        match self {
            IngestError::RowParse { line, .. }
            | IngestError::DuplicateKey { line, .. }
            | IngestError::RegistryLookup { line, .. }
            | IngestError::RegistryAmbiguity { line, .. } => Some(*line),
            _ => None,
        }
    }
}
