//! Git integration utilities for locating the repository being bootstrapped.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::domain::InputValidationError;

/// Remote consulted when the caller does not name one.
pub const DEFAULT_REMOTE: &str = "origin";

fn git_output(dir: &Path, args: &[&str]) -> Result<String, String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| format!("failed to run git: {e}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("git {} failed: {}", args.join(" "), stderr.trim()));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Top-level directory of the work tree containing `dir`.
pub fn repository_root(dir: &Path) -> Result<PathBuf, InputValidationError> {
    let root = git_output(dir, &["rev-parse", "--show-toplevel"])
        .map_err(InputValidationError::NotInRepository)?;
    if root.is_empty() {
        return Err(InputValidationError::NotInRepository(format!(
            "{} has no work tree",
            dir.display()
        )));
    }
    Ok(PathBuf::from(root))
}

/// URL of `remote` as configured in the repository containing `dir`.
pub fn remote_url(dir: &Path, remote: &str) -> Result<String, InputValidationError> {
    if !is_git_repo(dir) {
        return Err(InputValidationError::NotInRepository(
            dir.display().to_string(),
        ));
    }
    let url = git_output(dir, &["remote", "get-url", remote])
        .map_err(|_| InputValidationError::MissingRemote(remote.to_string()))?;
    if url.is_empty() {
        return Err(InputValidationError::MissingRemote(remote.to_string()));
    }
    Ok(url)
}
