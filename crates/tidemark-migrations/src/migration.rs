//! Migration files and their naming convention.
//!
//! A migration file is named `<version>_<name>.<ext>`, for example
//! `0003_add_users_email.sql`. The version is the numeric value of the digit
//! prefix, so `3_x.sql` and `0003_y.sql` share version 3. Version 0 is
//! reserved for "nothing applied" and is not a valid migration version.

use std::path::{Path, PathBuf};

use tidemark_core::TidemarkError;

/// A discovered migration file whose contents have not been read yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// The version parsed from the file name prefix.
    pub version: u64,
    /// The name between the version prefix and the extension.
    pub name: String,
    /// The path to the file.
    pub path: PathBuf,
}

impl MigrationFile {
    /// Parses a migration file name into `(version, name)`.
    ///
    /// Returns `None` if the name does not follow `<version>_<name>.<ext>`,
    /// if the version is 0, or if it does not fit the ledger's signed 64-bit
    /// version column.
    ///
    /// # Examples
    ///
    /// ```
    /// use tidemark_migrations::MigrationFile;
    ///
    /// assert_eq!(
    ///     MigrationFile::parse_file_name("0002_seed_users.sql"),
    ///     Some((2, "seed_users".to_string()))
    /// );
    /// assert_eq!(MigrationFile::parse_file_name("schema.sql"), None);
    /// ```
    pub fn parse_file_name(file_name: &str) -> Option<(u64, String)> {
        let (stem, ext) = file_name.rsplit_once('.')?;
        if ext.is_empty() {
            return None;
        }
        let (digits, name) = stem.split_once('_')?;
        if digits.is_empty() || name.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let version: u64 = digits.parse().ok()?;
        if version == 0 || i64::try_from(version).is_err() {
            return None;
        }
        Some((version, name.to_string()))
    }

    /// Builds a `MigrationFile` from a path, validating its file name.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TidemarkError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TidemarkError::InvalidName(path.display().to_string()))?;
        let (version, name) = Self::parse_file_name(file_name)
            .ok_or_else(|| TidemarkError::InvalidName(file_name.to_string()))?;
        Ok(Self {
            version,
            name,
            path: path.to_path_buf(),
        })
    }

    /// Reads the file's contents.
    pub fn read(&self) -> Result<Migration, TidemarkError> {
        let raw_text = std::fs::read_to_string(&self.path)?;
        Ok(Migration {
            version: self.version,
            name: self.name.clone(),
            path: self.path.clone(),
            raw_text,
        })
    }
}

/// A migration file together with its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// The migration version.
    pub version: u64,
    /// The migration name.
    pub name: String,
    /// The file the migration was read from.
    pub path: PathBuf,
    /// The unparsed statements.
    pub raw_text: String,
}

impl Migration {
    /// Creates an in-memory migration that did not come from a file.
    pub fn new(version: u64, name: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            path: PathBuf::new(),
            raw_text: raw_text.into(),
        }
    }
}
