//! Persisted scratch state.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::HarnessError;
use crate::k8s::KubectlOptions;
use crate::tools::terraform::TerraformOptions;

/// Directory, relative to the working directory, holding the state files.
pub const TEST_DATA_DIR: &str = ".test-data";

/// Key under which terraform options are stored.
pub const TERRAFORM_OPTIONS_KEY: &str = "TerraformOptions";

/// Key under which cluster client options are stored.
pub const KUBECTL_OPTIONS_KEY: &str = "KubectlOptions";

/// Key/value scratch state scoped to one working directory.
///
/// Values are stored as `<working_dir>/.test-data/<key>.json`. Reading a key
/// that was never written is an error, never a default value: it means a
/// stage ran before the stage that produces its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchState {
    working_dir: PathBuf,
}

impl ScratchState {
    /// Creates a scratch state rooted at `working_dir`.
    ///
    /// Nothing is created on disk until the first save.
    #[must_use]
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    /// Returns the working directory.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Returns the directory holding the state files.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.working_dir.join(TEST_DATA_DIR)
    }

    /// Returns the file a key maps to.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, HarnessError> {
        validate_key(key)?;
        Ok(self.data_dir().join(format!("{key}.json")))
    }

    /// Serializes and stores a value under `key`, replacing any previous value.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), HarnessError>
    where
        T: Serialize + ?Sized,
    {
        let path = self.path_for(key)?;
        let dir = self.data_dir();
        fs::create_dir_all(&dir)?;

        let bytes = serde_json::to_vec_pretty(value)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&path).map_err(|e| HarnessError::Io(e.error))?;

        info!(key, path = %path.display(), "Storing test data so it can be reused later");
        Ok(())
    }

    /// Loads the value stored under `key`.
    pub fn load<T>(&self, key: &str) -> Result<T, HarnessError>
    where
        T: DeserializeOwned,
    {
        let path = self.path_for(key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(HarnessError::MissingState {
                    key: key.to_string(),
                    path,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        if value.is_null() {
            return Err(HarnessError::MissingState {
                key: key.to_string(),
                path,
            });
        }

        debug!(key, path = %path.display(), "Loaded test data");
        Ok(serde_json::from_value(value)?)
    }

    /// Loads the value stored under `key`, or `None` if it was never written.
    pub fn load_optional<T>(&self, key: &str) -> Result<Option<T>, HarnessError>
    where
        T: DeserializeOwned,
    {
        match self.load(key) {
            Ok(value) => Ok(Some(value)),
            Err(HarnessError::MissingState { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Stores a plain string.
    pub fn save_string(&self, key: &str, value: &str) -> Result<(), HarnessError> {
        self.save(key, value)
    }

    /// Loads a plain string.
    pub fn load_string(&self, key: &str) -> Result<String, HarnessError> {
        self.load(key)
    }

    /// Stores terraform options.
    pub fn save_terraform_options(&self, options: &TerraformOptions) -> Result<(), HarnessError> {
        self.save(TERRAFORM_OPTIONS_KEY, options)
    }

    /// Loads terraform options.
    pub fn load_terraform_options(&self) -> Result<TerraformOptions, HarnessError> {
        self.load(TERRAFORM_OPTIONS_KEY)
    }

    /// Stores cluster client options.
    pub fn save_kubectl_options(&self, options: &KubectlOptions) -> Result<(), HarnessError> {
        self.save(KUBECTL_OPTIONS_KEY, options)
    }

    /// Loads cluster client options.
    pub fn load_kubectl_options(&self) -> Result<KubectlOptions, HarnessError> {
        self.load(KUBECTL_OPTIONS_KEY)
    }

    /// Returns true if a non-null value is stored under `key`.
    pub fn contains(&self, key: &str) -> Result<bool, HarnessError> {
        Ok(self.load_optional::<serde_json::Value>(key)?.is_some())
    }

    /// Removes the value stored under `key`. Returns true if one existed.
    pub fn remove(&self, key: &str) -> Result<bool, HarnessError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the stored keys, sorted.
    pub fn keys(&self) -> Result<Vec<String>, HarnessError> {
        let entries = match fs::read_dir(self.data_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Deletes every stored value.
    pub fn clear(&self) -> Result<(), HarnessError> {
        let dir = self.data_dir();
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!(path = %dir.display(), "Cleared test data");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_key(key: &str) -> Result<(), HarnessError> {
    let invalid = key.is_empty()
        || key == "."
        || key.contains("..")
        || key.contains('/')
        || key.contains('\\')
        || key.contains('\0');
    if invalid {
        Err(HarnessError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}
