//! Local partitioned registry: one NDJSON file of `Stream` documents per
//! site code.
//!
//! File layout:
//!   <dir>/<partition>.ndjson                    (committed documents)
//!   <dir>/_staging/<partition>.inprogress       (batch being promoted)
//!
//! A batch is all-or-nothing: every operation is applied to an in-memory copy
//! of the partition first, and the file is only replaced when all of them
//! succeeded. Otherwise the first failing operation keeps its own status and
//! every other one reports 424.

use ahash::RandomState;
use parking_lot::Mutex;
use std::fs;
use std::hash::{BuildHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::RegistryError;
use crate::model::Stream;
use crate::ndjson::{read_documents, NdjsonWriter};
use crate::registry::{apply_operation, BatchOperation, OperationResult, StoreClient, STATUS_FAILED_DEPENDENCY};

const BUF_BYTES: usize = 256 * 1024;

pub struct FileRegistry {
    dir: PathBuf,
    state: RandomState,
    // serializes read-modify-write cycles on partition files
    lock: Mutex<()>,
}

impl FileRegistry {
    /// Open (creating if needed) a registry rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join("_staging"))?;
        // Fixed seeds keep partition file names stable across runs.
        let state = RandomState::with_seeds(
            0x1357_9bdf_acce_55ed,
            0x2468_ace0_fdb9_8642,
            0xfeed_face_dead_beef,
            0x0bad_f00d_c0de_cafe,
        );
        Ok(Self { dir, state, lock: Mutex::new(()) })
    }

    /// File stem for a partition key. Keys that are not plain file names get
    /// a hash suffix so two keys never share a file.
    fn stem(&self, partition_key: &str) -> String {
        let clean: String = partition_key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        if clean == partition_key && !clean.is_empty() {
            return clean;
        }
        let mut h = self.state.build_hasher();
        partition_key.hash(&mut h);
        format!("{}_{:016x}", clean, h.finish())
    }

    pub fn partition_path(&self, partition_key: &str) -> PathBuf {
        self.dir.join(format!("{}.ndjson", self.stem(partition_key)))
    }

    fn staging_path(&self, partition_key: &str) -> PathBuf {
        self.dir.join("_staging").join(format!("{}.inprogress", self.stem(partition_key)))
    }

    /// All documents of one partition, in file order.
    pub fn load_partition(&self, partition_key: &str) -> Result<Vec<Stream>, RegistryError> {
        Ok(read_documents(&self.partition_path(partition_key), BUF_BYTES)?)
    }

    fn store_partition(&self, partition_key: &str, docs: &[Stream]) -> Result<(), RegistryError> {
        let tmp = self.staging_path(partition_key);
        let mut w = NdjsonWriter::create(&tmp, BUF_BYTES)?;
        for doc in docs {
            w.write_document(doc)?;
        }
        w.finish_atomic(&self.partition_path(partition_key))
            .map_err(|e| RegistryError::Transport(format!("{e:#}")))
    }
}

impl StoreClient for FileRegistry {
    fn find(&self, sensor_id: &str, site_code: &str) -> Result<Vec<Stream>, RegistryError> {
        let _guard = self.lock.lock();
        let mut docs = self.load_partition(site_code)?;
        docs.retain(|d| d.sensor_id == sensor_id);
        Ok(docs)
    }

    fn submit_batch(
        &self,
        partition_key: &str,
        ops: &[BatchOperation<'_>],
    ) -> Result<Vec<OperationResult>, RegistryError> {
        let _guard = self.lock.lock();
        let mut working = self.load_partition(partition_key)?;

        let mut results = Vec::with_capacity(ops.len());
        let mut failed_at = None;
        for (i, op) in ops.iter().enumerate() {
            let res = apply_operation(&mut working, partition_key, op);
            if !res.is_success() {
                failed_at = Some(i);
                results.push(res);
                break;
            }
            results.push(res);
        }

        match failed_at {
            None => {
                self.store_partition(partition_key, &working)?;
                debug!(partition = partition_key, ops = ops.len(), "batch committed");
                Ok(results)
            }
            Some(i) => {
                debug!(partition = partition_key, failed_index = i, "batch rolled back");
                Ok((0..ops.len())
                    .map(|j| {
                        if j == i {
                            results[i]
                        } else {
                            OperationResult::new(STATUS_FAILED_DEPENDENCY)
                        }
                    })
                    .collect())
            }
        }
    }
}
