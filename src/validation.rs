//! Path checks performed up front so runs fail before any work is queued.

use crate::error::{FlowError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Validates that a file exists and is readable.
pub fn validate_input_file(path: &str) -> Result<PathBuf> {
	let path = Path::new(path);
	if !path.exists() {
		return Err(FlowError::FileNotFound(path.display().to_string()));
	}
	if !path.is_file() {
		return Err(FlowError::Config(format!("{} is not a file", path.display())));
	}
	fs::metadata(path)?;
	Ok(path.to_path_buf())
}

/// Validates that a directory exists and is readable.
pub fn validate_directory(path: &str) -> Result<PathBuf> {
	let path = Path::new(path);
	if !path.exists() {
		return Err(FlowError::FileNotFound(path.display().to_string()));
	}
	if !path.is_dir() {
		return Err(FlowError::Config(format!("{} is not a directory", path.display())));
	}
	Ok(path.to_path_buf())
}

/// Validates that `path` can plausibly be written: its parent must exist and
/// the path itself must not name a directory.
pub fn validate_output_path(path: &str) -> Result<PathBuf> {
	let path = Path::new(path);
	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() && !parent.is_dir() {
			return Err(FlowError::Config(format!(
				"parent directory {} does not exist",
				parent.display()
			)));
		}
	}
	if path.exists() && !path.is_file() {
		return Err(FlowError::Config(format!(
			"{} exists but is not a file",
			path.display()
		)));
	}
	Ok(path.to_path_buf())
}
