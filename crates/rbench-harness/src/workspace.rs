//! Isolated filesystem scopes.
//!
//! A [`Scope`] is an exclusively owned temporary directory. The baseline lives
//! in one scope for the whole run; every trial gets a fresh scope that is
//! released as soon as the trial is recorded. Cleanup is guaranteed via Drop,
//! so an aborted run never leaks its working copies.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rbench_error::{BenchError, Result};
use tempfile::TempDir;
use tracing::debug;

/// Scratch directory owned by exactly one phase of the run.
#[derive(Debug)]
pub struct Scope {
    dir: TempDir,
}

impl Scope {
    /// Allocate a new empty directory under `root` (or the system temp dir).
    pub fn create(root: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|err| BenchError::resource(format!("create scope with prefix {prefix:?}"), err))?;

        debug!(
            target: "rbench::workspace",
            path = %dir.path().display(),
            "scope created"
        );
        Ok(Self { dir })
    }

    /// Directory backing this scope.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `name` inside this scope.
    #[must_use]
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Copy each source file into the scope under its own file name.
    ///
    /// Returns the destination paths in the order of `sources`.
    pub fn copy_into<P: AsRef<Path>>(&self, sources: &[P]) -> Result<Vec<PathBuf>> {
        let mut copied = Vec::with_capacity(sources.len());
        for source in sources {
            let source = source.as_ref();
            let Some(name) = source.file_name() else {
                return Err(BenchError::Copy {
                    from: source.to_path_buf(),
                    to: self.path().to_path_buf(),
                    source: io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"),
                });
            };
            let dest = self.path().join(name);
            fs::copy(source, &dest).map_err(|err| BenchError::Copy {
                from: source.to_path_buf(),
                to: dest.clone(),
                source: err,
            })?;
            copied.push(dest);
        }
        Ok(copied)
    }

    /// Remove the scope and everything in it, surfacing removal failures.
    pub fn release(self) -> Result<()> {
        let path = self.path().to_path_buf();
        self.dir
            .close()
            .map_err(|err| BenchError::resource(format!("remove scope {}", path.display()), err))?;
        debug!(target: "rbench::workspace", path = %path.display(), "scope released");
        Ok(())
    }
}
