//! driver/edit.rs
//!
//! Transactional source edits. A `ScopedEdit` restores the snapshot it took
//! unless it is explicitly committed.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::error::EditError;

#[derive(Debug)]
pub struct ScopedEdit {
    path: PathBuf,
    original: String,
    updated: String,
    span: Range<usize>,
    replacement_len: usize,
    line_delta: isize,
    settled: bool,
}

impl ScopedEdit {
    /// Replaces `span` of the file with `replacement`, checking first that
    /// the span still holds `expected`.
    pub fn apply(
        path: &Path,
        span: Range<usize>,
        expected: &str,
        replacement: &str,
    ) -> Result<Self, EditError> {
        let original = fs::read_to_string(path).map_err(|source| EditError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if original.get(span.clone()) != Some(expected) {
            return Err(EditError::StaleSpan {
                path: path.to_path_buf(),
                start: span.start,
                end: span.end,
            });
        }

        let mut updated = String::with_capacity(original.len() + replacement.len());
        updated.push_str(&original[..span.start]);
        updated.push_str(replacement);
        updated.push_str(&original[span.end..]);

        // The snapshot is armed before the write so a partial write is undone too.
        let mut edit = Self {
            path: path.to_path_buf(),
            original,
            updated,
            span,
            replacement_len: replacement.len(),
            line_delta: newlines(replacement) - newlines(expected),
            settled: false,
        };

        fs::write(&edit.path, &edit.updated).map_err(|source| {
            edit.settled = edit.restore().is_ok();
            EditError::Io {
                path: edit.path.clone(),
                source,
            }
        })?;

        tracing::debug!(file = %edit.path.display(), span = ?edit.span, "candidate written");
        Ok(edit)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File contents with the replacement applied.
    pub fn updated(&self) -> &str {
        &self.updated
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    /// How far text after the edited span moved.
    pub fn byte_delta(&self) -> isize {
        self.replacement_len as isize - self.span.len() as isize
    }

    pub fn line_delta(&self) -> isize {
        self.line_delta
    }

    /// Keeps the edit on disk.
    pub fn commit(mut self) {
        self.settled = true;
    }

    /// Restores the snapshot now, surfacing any IO error.
    pub fn rollback(mut self) -> Result<(), EditError> {
        let result = self.restore();
        self.settled = true;
        result
    }

    fn restore(&mut self) -> Result<(), EditError> {
        fs::write(&self.path, &self.original).map_err(|source| EditError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(file = %self.path.display(), "source restored");
        Ok(())
    }
}

impl Drop for ScopedEdit {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Err(e) = self.restore() {
            tracing::error!(err = %e, "failed to restore source after an abandoned edit");
        }
    }
}

fn newlines(s: &str) -> isize {
    s.bytes().filter(|b| *b == b'\n').count() as isize
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = "def f(x):\n    pass\n\n\ndef g():\n    ...\n";

    fn fixture() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.py");
        fs::write(&path, SRC).unwrap();
        (dir, path)
    }

    #[test]
    fn drop_restores_exact_bytes() {
        let (_dir, path) = fixture();
        {
            let edit = ScopedEdit::apply(&path, 14..18, "pass", "y = x\n    return y").unwrap();
            assert_eq!(fs::read_to_string(&path).unwrap(), edit.updated());
            assert_eq!(edit.byte_delta(), 14);
            assert_eq!(edit.line_delta(), 1);
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), SRC);
    }

    #[test]
    fn commit_keeps_edit() {
        let (_dir, path) = fixture();
        let edit = ScopedEdit::apply(&path, 14..18, "pass", "return x").unwrap();
        edit.commit();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "def f(x):\n    return x\n\n\ndef g():\n    ...\n"
        );
    }

    #[test]
    fn explicit_rollback() {
        let (_dir, path) = fixture();
        let edit = ScopedEdit::apply(&path, 14..18, "pass", "return x").unwrap();
        edit.rollback().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), SRC);
    }

    #[test]
    fn stale_span_is_refused_without_writing() {
        let (_dir, path) = fixture();
        let err = ScopedEdit::apply(&path, 13..17, "pass", "return x").unwrap_err();
        assert!(matches!(err, EditError::StaleSpan { start: 13, end: 17, .. }));

        let err = ScopedEdit::apply(&path, 100..104, "pass", "return x").unwrap_err();
        assert!(matches!(err, EditError::StaleSpan { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), SRC);
    }
}
