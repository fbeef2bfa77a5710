//! Row-count progress bar.

use indicatif::{ProgressBar, ProgressStyle};

fn count_style() -> ProgressStyle {
    match ProgressStyle::with_template(
        "{spinner:.green} {msg} {pos}/{len} [{bar:.cyan/blue}] {percent:>3}%  \
         it/s: {per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}",
    ) {
        Ok(style) => style.progress_chars("█▉▊▋▌▍▎▏  "),
        Err(_) => ProgressStyle::default_bar(),
    }
}

/// A small wrapper around an `indicatif` count bar. A disabled scope draws
/// nothing, so callers can tick it unconditionally.
pub struct ProgressScope {
    pb: ProgressBar,
}

impl ProgressScope {
    pub fn count<T: Into<String>>(label: T, total: u64) -> Self {
        let pb = ProgressBar::new(total);
        pb.set_style(count_style());
        let label = label.into();
        if !label.is_empty() {
            pb.set_message(label);
        }
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { pb }
    }

    pub fn disabled() -> Self {
        Self { pb: ProgressBar::hidden() }
    }

    #[inline]
    pub fn inc_items(&self, delta: u64) {
        self.pb.inc(delta);
    }

    pub fn finish<T: Into<String>>(&self, msg: T) {
        self.pb.finish_with_message(msg.into());
    }
}
