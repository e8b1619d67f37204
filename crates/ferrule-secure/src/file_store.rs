//! File-backed store: one file per key under `<root>/<domain>/`.
//!
//! Keys are percent-escaped into file names, so any non-empty string is a
//! valid key and no key can name a path outside the domain directory.
//! Writes go to a temporary file in the same directory that is renamed over
//! the target, so readers see either the old or the new contents.

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::StoreError;
use crate::store::SecureStore;

/// Environment variable naming the root directory used by
/// [`FileStore::from_env`].
pub const ROOT_DIR_ENV: &str = "FERRULE_SECURE_DIR";

/// Store keeping each key in its own file.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates a store for `domain` under `root`. Nothing is touched on disk
    /// until the first write.
    #[must_use]
    pub fn new(root: impl AsRef<Path>, domain: &str) -> Self {
        Self {
            dir: root.as_ref().join(escape(domain)),
        }
    }

    /// Creates a store for `domain` under the directory named by
    /// [`ROOT_DIR_ENV`], or the system temp directory if it is unset.
    #[must_use]
    pub fn from_env(domain: &str) -> Self {
        let root = env::var_os(ROOT_DIR_ENV).map_or_else(env::temp_dir, PathBuf::from);
        Self::new(root, domain)
    }

    /// Directory holding this store's files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey {
                key: String::new(),
                reason: "key must not be empty",
            });
        }
        Ok(self.dir.join(escape(key)))
    }
}

impl SecureStore for FileStore {
    fn load(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        match fs::read(self.path_for(key)?) {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;
        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(data)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|err| err.error)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)?) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        match fs::remove_dir_all(&self.dir) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

/// Percent-escapes everything except ASCII alphanumerics, `-` and `_`.
fn escape(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            escaped.push(char::from(byte));
        } else {
            let _ = write!(escaped, "%{byte:02X}");
        }
    }
    escaped
}
