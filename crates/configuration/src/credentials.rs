use crate::error::ConfigError;
use std::fmt;
use std::path::{Path, PathBuf};

/// Secrets read from a line-indexed file: line `n` (zero-based) holds credential `n`.
pub struct CredentialStore {
    path: PathBuf,
    lines: Vec<String>,
}

impl CredentialStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::CredentialFileMissing(path));
            }
            Err(source) => return Err(ConfigError::CredentialFileUnreadable { path, source }),
        };
        let lines = contents.lines().map(str::to_string).collect();
        Ok(Self { path, lines })
    }

    /// Builds a store from in-memory lines.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: PathBuf::from("<memory>"),
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the trimmed credential on line `index`.
    pub fn get_credential(&self, index: usize) -> Result<String, ConfigError> {
        let line = self
            .lines
            .get(index)
            .ok_or_else(|| ConfigError::CredentialLineMissing {
                index,
                path: self.path.clone(),
            })?;
        let value = line.trim();
        if value.is_empty() {
            return Err(ConfigError::EmptyCredential(index));
        }
        Ok(value.to_string())
    }
}

// Never print the secrets themselves.
impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("path", &self.path)
            .field("lines", &self.lines.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_lines_by_index() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first-token").unwrap();
        writeln!(file, "  second-token  ").unwrap();
        writeln!(file).unwrap();

        let store = CredentialStore::load(file.path()).unwrap();
        assert_eq!(store.get_credential(0).unwrap(), "first-token");
        assert_eq!(store.get_credential(1).unwrap(), "second-token");
        assert!(matches!(
            store.get_credential(2),
            Err(ConfigError::EmptyCredential(2))
        ));
        assert!(matches!(
            store.get_credential(9),
            Err(ConfigError::CredentialLineMissing { index: 9, .. })
        ));
    }

    #[test]
    fn missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = CredentialStore::load(dir.path().join("nope.txt")).unwrap_err();
        assert!(matches!(err, ConfigError::CredentialFileMissing(_)));
    }

    #[test]
    fn debug_hides_secrets() {
        let store = CredentialStore::from_lines(["super-secret"]);
        let rendered = format!("{store:?}");
        assert!(!rendered.contains("super-secret"));
    }
}
