//! Filesystem helpers for module copies and temporary kubeconfigs.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::config::Environment;
use crate::errors::HarnessError;

const LOCK_FILE: &str = ".terraform.lock.hcl";

fn is_excluded(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    (name.starts_with('.') && name != LOCK_FILE)
        || name.ends_with(".tfstate")
        || name.ends_with(".tfstate.backup")
}

/// Copies a terraform module into a fresh temporary directory.
///
/// Returns `<tmp>/<test_name>XXXX/<module dir name>`. The directory is not
/// removed on drop: later stages, possibly in another process, run in it.
/// Hidden entries (except the provider lock file), `.terraform/` and state
/// files are left behind.
pub fn copy_module_to_temp(source: &Path, test_name: &str) -> Result<PathBuf, HarnessError> {
    let source = source.canonicalize()?;
    if !source.is_dir() {
        return Err(io::Error::new(
            ErrorKind::NotFound,
            format!("module directory {} does not exist", source.display()),
        )
        .into());
    }
    let module_name = source
        .file_name()
        .map_or_else(|| "module".into(), ToOwned::to_owned);

    let root = tempfile::Builder::new().prefix(test_name).tempdir()?.keep();
    let dest = root.join(module_name);
    fs::create_dir_all(&dest)?;

    let walker = WalkDir::new(&source)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_excluded(e));
    let mut copied = 0usize;
    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(&source)
            .map_err(io::Error::other)?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    info!(
        source = %source.display(),
        dest = %dest.display(),
        files = copied,
        "Copied module to temporary directory"
    );
    Ok(dest)
}

fn kubeconfig_source(env: &Environment) -> Option<PathBuf> {
    if let Some(value) = env.get("KUBECONFIG") {
        return std::env::split_paths(value).find(|p| !p.as_os_str().is_empty());
    }
    dirs::home_dir().map(|home| home.join(".kube").join("config"))
}

/// Copies the invoking user's kubeconfig into a persistent temporary file.
///
/// The source is the first entry of `KUBECONFIG`, or `~/.kube/config`. When
/// neither exists the temporary file is created empty.
pub fn copy_home_kubeconfig_to_temp(env: &Environment) -> Result<PathBuf, HarnessError> {
    let file = tempfile::Builder::new().prefix("kubeconfig-").tempfile()?;
    let (_, path) = file.keep().map_err(|e| e.error)?;

    match kubeconfig_source(env) {
        Some(source) if source.is_file() => {
            fs::copy(&source, &path)?;
            info!(source = %source.display(), path = %path.display(), "Copied kubeconfig");
        }
        source => {
            debug!(?source, path = %path.display(), "No kubeconfig to copy, starting empty");
        }
    }
    Ok(path)
}

/// Removes a file, treating an already-missing file as success.
///
/// Returns true if a file was removed.
pub fn remove_file_if_exists(path: &Path) -> Result<bool, HarnessError> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "Removed file");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
