//! Migration loader for discovering migrations from the filesystem.
//!
//! The [`MigrationLoader`] scans one directory for files named
//! `<version>_<name>.<ext>` and returns them as [`Migrations`], sorted by
//! numeric version. Only file names are inspected while scanning; contents are
//! read lazily when the migrations are iterated, and the sequence can be
//! iterated any number of times.
//!
//! Files that do not follow the naming convention are skipped with a warning.
//! Gaps between versions are allowed. Two files with the same version are a
//! [`TidemarkError::DuplicateVersion`] error.

use std::path::{Path, PathBuf};

use tidemark_core::TidemarkError;

use crate::migration::{Migration, MigrationFile};

/// Discovers migration files in a directory.
pub struct MigrationLoader {
    /// The directory containing migration files.
    migrations_dir: PathBuf,
}

impl MigrationLoader {
    /// Creates a new loader for the given migrations directory.
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    /// Returns the migrations directory.
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Scans the directory and returns the migrations sorted by version.
    ///
    /// A directory without any matching file yields an empty set.
    pub fn load(&self) -> Result<Migrations, TidemarkError> {
        let entries = std::fs::read_dir(&self.migrations_dir).map_err(|e| {
            TidemarkError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Cannot read migrations directory '{}': {e}",
                    self.migrations_dir.display()
                ),
            ))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                tracing::warn!(path = %path.display(), "skipping file with non UTF-8 name");
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            match MigrationFile::from_path(&path) {
                Ok(file) => files.push(file),
                Err(e) => tracing::warn!(path = %path.display(), "skipping file: {e}"),
            }
        }

        Migrations::from_files(files)
    }
}

/// An ordered, restartable sequence of migrations.
///
/// Holds only file metadata. [`iter`](Migrations::iter) reads each file when
/// it is reached.
#[derive(Debug, Clone, Default)]
pub struct Migrations {
    files: Vec<MigrationFile>,
}

impl Migrations {
    /// Sorts the files by version and rejects duplicate versions.
    pub fn from_files(mut files: Vec<MigrationFile>) -> Result<Self, TidemarkError> {
        files.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.path.cmp(&b.path)));
        if let Some(pair) = files.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(TidemarkError::DuplicateVersion {
                version: pair[0].version,
                first: pair[0].path.clone(),
                second: pair[1].path.clone(),
            });
        }
        Ok(Self { files })
    }

    /// Returns the number of migrations.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if there are no migrations.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Returns the migration files in version order.
    pub fn files(&self) -> &[MigrationFile] {
        &self.files
    }

    /// Returns the versions in ascending order.
    pub fn versions(&self) -> Vec<u64> {
        self.files.iter().map(|f| f.version).collect()
    }

    /// Returns the highest version, if any.
    pub fn latest_version(&self) -> Option<u64> {
        self.files.last().map(|f| f.version)
    }

    /// Returns the files with a version strictly greater than `version`.
    pub fn after(&self, version: u64) -> &[MigrationFile] {
        let start = self.files.partition_point(|f| f.version <= version);
        &self.files[start..]
    }

    /// Iterates over the migrations in version order, reading each file lazily.
    pub fn iter(&self) -> impl Iterator<Item = Result<Migration, TidemarkError>> + '_ {
        self.files.iter().map(MigrationFile::read)
    }
}
