use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use tracing::warn;

static TRANSIENT_COUNTER: AtomicUsize = AtomicUsize::new(1);

// ============== Transient Files ==============

/// A file that only lives for the duration of one request.
///
/// The file is removed when the guard is dropped, whichever way the owning
/// scope exits. [`TransientFile::release`] removes it eagerly and reports
/// failures.
#[derive(Debug)]
pub struct TransientFile {
    path: PathBuf,
    removed: bool,
}

impl TransientFile {
    /// Reserve a unique path `{dir}/{prefix}_{key}_{seq}.{ext}`.
    ///
    /// `key` is sanitized to `[A-Za-z0-9_-]`; the process-wide sequence
    /// number keeps concurrent requests for the same key apart.
    pub fn reserve(dir: &Path, prefix: &str, key: &str, ext: &str) -> Self {
        let key: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .take(64)
            .collect();
        let n = TRANSIENT_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self {
            path: dir.join(format!("{prefix}_{key}_{n}.{ext}")),
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn release(mut self) -> std::io::Result<()> {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove transient file");
            }
        }
    }
}

// ============== Text Helpers ==============

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}
