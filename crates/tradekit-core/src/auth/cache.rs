//! On-disk cache holding at most one access token.
//!
//! The record is `{"access_token": "...", "expires_at": <unix seconds>}`,
//! written owner-only. Saves go through a temporary sibling file and a
//! rename so a crash mid-write never leaves a half-written record behind.
//! No cross-process locking: concurrent saves are last-writer-wins.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::Token;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("no cached token")]
    Missing,

    #[error("cached token is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("token cache I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Token, CacheError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(CacheError::Missing),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    /// Replace the cached record with `token`.
    pub fn save(&self, token: &Token) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_private_dir(parent)?;
        }

        let contents = serde_json::to_vec_pretty(token)?;
        let tmp_path = self.tmp_path();
        if let Err(e) = write_private_file(&tmp_path, &contents) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!(path = %self.path.display(), "Saved token cache");
        Ok(())
    }

    /// Remove the cached record. A missing record is not an error.
    pub fn clear(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Cleared token cache");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".tmp-{}", std::process::id()));
        self.path.with_file_name(name)
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)
}

fn write_private_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_in(dir: &tempfile::TempDir) -> TokenCache {
        TokenCache::new(dir.path().join("config").join("token.json"))
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let token = Token::new("tok1", 1_900_000_000);

        cache.save(&token).unwrap();
        assert_eq!(cache.load().unwrap(), token);
    }

    #[test]
    fn test_save_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);

        cache.save(&Token::new("a-much-longer-first-token", 100)).unwrap();
        cache.save(&Token::new("b", 200)).unwrap();
        assert_eq!(cache.load().unwrap(), Token::new("b", 200));

        // No temp files left behind
        let entries = std::fs::read_dir(cache.path().parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(cache_in(&dir).load(), Err(CacheError::Missing)));
    }

    #[test]
    fn test_load_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        std::fs::create_dir_all(cache.path().parent().unwrap()).unwrap();
        std::fs::write(cache.path(), "{\"access_token\": 12").unwrap();

        assert!(matches!(cache.load(), Err(CacheError::Corrupt(_))));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.save(&Token::new("tok", 100)).unwrap();

        cache.clear().unwrap();
        assert!(!cache.path().exists());
        cache.clear().unwrap();
    }

    #[test]
    fn test_clear_non_empty_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        std::fs::create_dir_all(cache.path()).unwrap();
        std::fs::write(cache.path().join("keep"), "x").unwrap();

        assert!(cache.clear().is_err());
        assert!(cache.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_save_uses_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.save(&Token::new("tok", 100)).unwrap();

        let file_mode = std::fs::metadata(cache.path()).unwrap().permissions().mode();
        let dir_mode = std::fs::metadata(cache.path().parent().unwrap())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(file_mode & 0o777, 0o600);
        assert_eq!(dir_mode & 0o777, 0o700);
    }
}
