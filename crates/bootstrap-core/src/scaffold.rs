//! Local environment scaffolding.
//!
//! Copies `<environments>/_sample` to `<environments>/<env>`, dropping the
//! `.sample` suffix from file names, then points `global.yaml` at the
//! requested tenant. The copy is staged in a hidden sibling directory and
//! renamed into place only once the edit succeeded, so a failed scaffold
//! leaves no partial directory behind. An existing target is never touched.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::domain::{Environment, InputValidationError};

pub const SAMPLE_DIR: &str = "_sample";
pub const SAMPLE_SUFFIX: &str = ".sample";
pub const GLOBAL_FILE: &str = "global.yaml";
pub const TENANT_KEY: &str = "tenant";

/// What scaffolding did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "path", rename_all = "lowercase")]
pub enum ScaffoldOutcome {
    Created(PathBuf),
    /// Target already existed and was left as is
    Skipped(PathBuf),
}

/// Scaffold `environment` under `environments_dir` for `tenant`.
pub fn scaffold_environment(
    environments_dir: &Path,
    environment: Environment,
    tenant: &str,
) -> Result<ScaffoldOutcome, InputValidationError> {
    let target = environments_dir.join(environment.as_str());
    if target.exists() {
        info!(path = %target.display(), "environment directory exists, skipping scaffold");
        return Ok(ScaffoldOutcome::Skipped(target));
    }

    let sample = environments_dir.join(SAMPLE_DIR);
    if !sample.is_dir() {
        return Err(InputValidationError::ScaffoldTemplateMissing(sample));
    }

    // Built one level down so the final directory gets default permissions
    // rather than the private mode of the temporary directory.
    let staging = tempfile::Builder::new()
        .prefix(&format!(".{}-", environment.as_str()))
        .tempdir_in(environments_dir)?;
    let staged = staging.path().join(environment.as_str());
    fs::create_dir(&staged)?;
    copy_sample_tree(&sample, &staged)?;

    let staged_global = staged.join(GLOBAL_FILE);
    let reported_global = target.join(GLOBAL_FILE);
    if !staged_global.is_file() {
        return Err(InputValidationError::ScaffoldKeyMissing {
            key: TENANT_KEY.to_string(),
            path: reported_global,
        });
    }
    let content = fs::read_to_string(&staged_global)?;
    let edited = set_top_level_key(&content, TENANT_KEY, tenant, &reported_global)?;
    fs::write(&staged_global, edited)?;

    fs::rename(&staged, &target)?;
    drop(staging);

    info!(path = %target.display(), tenant = %tenant, "environment scaffolded");
    Ok(ScaffoldOutcome::Created(target))
}

fn copy_sample_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let dest_name = name.strip_suffix(SAMPLE_SUFFIX).unwrap_or(&name);
        let dest = to.join(dest_name);

        if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
            copy_sample_tree(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

fn key_line_pattern(key: &str) -> Regex {
    Regex::new(&format!(
        r"(?m)^{}:(?P<value>[^#\r\n]*?)(?P<comment>[ \t]+#[^\r\n]*)?(?P<eol>\r?)$",
        regex::escape(key)
    ))
    .unwrap_or_else(|e| panic!("key pattern for '{key}' is invalid: {e}"))
}

/// Replace the value of a top-level scalar `key`, keeping every other byte
/// (including a trailing comment on the edited line) as it was.
pub fn set_top_level_key(
    content: &str,
    key: &str,
    value: &str,
    path: &Path,
) -> Result<String, InputValidationError> {
    let invalid_yaml = |reason: String| InputValidationError::ScaffoldInvalidYaml {
        path: path.to_path_buf(),
        reason,
    };
    let missing = || InputValidationError::ScaffoldKeyMissing {
        key: key.to_string(),
        path: path.to_path_buf(),
    };

    let doc: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| invalid_yaml(e.to_string()))?;
    if doc.get(key).is_none() {
        return Err(missing());
    }

    let rendered = render_scalar(value).map_err(invalid_yaml)?;
    let pattern = key_line_pattern(key);
    if !pattern.is_match(content) {
        // Present per the parser but not as a plain `key: value` line: a
        // quoted key, space before the colon, or a quoted value holding '#'.
        return Err(InputValidationError::ScaffoldUnsupportedLayout {
            key: key.to_string(),
            path: path.to_path_buf(),
        });
    }
    let edited = pattern
        .replacen(content, 1, |caps: &regex::Captures<'_>| {
            let comment = caps.name("comment").map_or("", |m| m.as_str());
            let eol = caps.name("eol").map_or("", |m| m.as_str());
            format!("{key}: {rendered}{comment}{eol}")
        })
        .into_owned();

    let check: serde_yaml::Value =
        serde_yaml::from_str(&edited).map_err(|e| invalid_yaml(e.to_string()))?;
    if check.get(key).and_then(serde_yaml::Value::as_str) != Some(value) {
        return Err(invalid_yaml(format!(
            "'{key}' did not read back as '{value}' after editing"
        )));
    }
    Ok(edited)
}

/// Render `value` as a single-line YAML scalar, quoting only when needed.
fn render_scalar(value: &str) -> Result<String, String> {
    let rendered = serde_yaml::to_string(value).map_err(|e| e.to_string())?;
    let rendered = rendered.trim_end_matches('\n');
    if rendered.contains('\n') {
        return Err(format!("value '{value}' does not fit on one line"));
    }
    Ok(rendered.to_string())
}
