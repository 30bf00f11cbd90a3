//! Persisting check results

use crate::error::OutputError;
use crate::proxy::AggregateState;
use std::fs;
use std::path::{Path, PathBuf};

/// Working proxies, one per line, in completion order.
///
/// With `annotate`, each line carries ` # <location>` when metadata is known.
pub fn render_working(state: &AggregateState, annotate: bool) -> String {
    state
        .working_proxies
        .iter()
        .map(|working| match (&working.metadata, annotate) {
            (Some(meta), true) => format!("{} # {}", working.address, meta),
            _ => working.address.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Failed proxies as `address # kind: message`, ordered by address
pub fn render_failed(state: &AggregateState) -> String {
    state
        .failed_proxies
        .iter()
        .map(|(address, failure)| format!("{address} # {failure}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace `path` with `content` in one step.
///
/// The content goes to a sibling temp file which is then renamed over the
/// target, so readers never see a partial list.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), OutputError> {
    let tmp = temp_path(path);
    let write_error = |source| OutputError::Write {
        path: tmp.clone(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| OutputError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(&tmp, content).map_err(write_error)?;

    fs::rename(&tmp, path).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        OutputError::Rename {
            from: tmp.clone(),
            to: path.to_path_buf(),
            source,
        }
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "output".into());
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}
