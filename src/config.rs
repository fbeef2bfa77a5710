use std::path::{Path, PathBuf};

use crate::batch::{BatchLimits, DEFAULT_BATCH_SIZE_LIMIT, DEFAULT_MAX_BATCH_OPERATIONS};
use crate::model::{TagMatch, UpdatePolicy};

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct IngestOptions {
    pub user: String,                   // stamped into created/updated audit fields
    pub update_policy: UpdatePolicy,
    pub tag_match: TagMatch,
    pub batch_size_limit: usize,        // serialized bytes per batch
    pub max_batch_operations: Option<usize>,
    pub output_dir: PathBuf,            // where correction files go
    pub correction_prefix: String,
    pub progress: bool,                 // show progress bar
    pub progress_label: Option<String>,

    // IO tuning
    pub read_buffer_bytes: usize,
    pub write_buffer_bytes: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            user: String::new(),
            update_policy: UpdatePolicy::TagsOnly,
            tag_match: TagMatch::Covers,
            batch_size_limit: DEFAULT_BATCH_SIZE_LIMIT,
            max_batch_operations: Some(DEFAULT_MAX_BATCH_OPERATIONS),
            output_dir: PathBuf::from("."),
            correction_prefix: "import-result".to_string(),
            progress: true,
            progress_label: None,

            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 256 * 1024,
        }
    }
}

impl IngestOptions {
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }
    pub fn with_update_policy(mut self, policy: UpdatePolicy) -> Self {
        self.update_policy = policy;
        self
    }
    /// `true` selects full field updates, `false` tags-only.
    pub fn with_full_update(self, yes: bool) -> Self {
        self.with_update_policy(if yes { UpdatePolicy::FullFieldUpdate } else { UpdatePolicy::TagsOnly })
    }
    pub fn with_tag_match(mut self, mode: TagMatch) -> Self {
        self.tag_match = mode;
        self
    }
    pub fn with_batch_size_limit(mut self, bytes: usize) -> Self {
        self.batch_size_limit = bytes.max(1);
        self
    }
    /// `None` lifts the per-batch operation cap.
    pub fn with_max_batch_operations(mut self, max: Option<usize>) -> Self {
        self.max_batch_operations = max.map(|n| n.max(1));
        self
    }
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_correction_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.correction_prefix = prefix.into();
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }

    // IO buffers tuning
    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buffer_bytes = read_bytes.max(8 * 1024);
        self.write_buffer_bytes = write_bytes.max(8 * 1024);
        self
    }

    pub fn batch_limits(&self) -> BatchLimits {
        BatchLimits { size_limit: self.batch_size_limit, max_operations: self.max_batch_operations }
    }
}
