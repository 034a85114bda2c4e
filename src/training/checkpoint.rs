//! Checkpoint persistence. Snapshots are bincode-serialized, byte-shuffled
//! for compressibility, and xz-compressed, one file per saved iteration under
//! `snapshots/<run_id>/`.

use crate::constants::file::{CHECKPOINT_EXTENSION, CHECKPOINT_PAD, CHECKPOINT_PREFIX, CHECKPOINT_VERSION};
use crate::error::{FlowError, Result};
use bincode::{deserialize, serialize};
use ndarray::ArrayD;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::num::FpCategory;
use std::path::{Path, PathBuf};
use xz2::read::{XzDecoder, XzEncoder};

const XZ_LEVEL: u32 = 7;
const STAGING_EXTENSION: &str = "partial";

/// Everything needed to restart a run: the parameter tensors in registration
/// order and the count of completed training steps that produced them.
/// Optimizer moments are not carried; a resumed run restarts Adam cold.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckpointDescription {
	pub version: u32,
	pub iteration: u64,
	pub saved_at: String,
	pub parameters: Vec<ArrayD<f32>>,
}

impl CheckpointDescription {
	pub fn new(iteration: u64, parameters: Vec<ArrayD<f32>>) -> Self {
		CheckpointDescription {
			version: CHECKPOINT_VERSION,
			iteration,
			saved_at: chrono::Utc::now().to_rfc3339(),
			parameters,
		}
	}
}

/// Serialises and compresses a checkpoint into its on-disk byte format.
pub fn checkpoint_to_bytes(mut desc: CheckpointDescription) -> Result<Vec<u8>> {
	// subnormals compress badly and carry no useful signal
	for arr in &mut desc.parameters {
		for e in arr.iter_mut() {
			if let FpCategory::Subnormal = e.classify() {
				*e = 0.0;
			}
		}
	}
	let serialized =
		serialize(&desc).map_err(|e| FlowError::Serialization(format!("checkpoint encoding failed: {}", e)))?;
	let shuffled = shuffle(&serialized, 4);
	let compressed = XzEncoder::new(shuffled.as_slice(), XZ_LEVEL)
		.bytes()
		.collect::<::std::result::Result<Vec<_>, _>>()?;
	Ok(compressed)
}

/// Decompresses and deserialises a checkpoint from its on-disk byte format.
pub fn checkpoint_from_bytes(data: &[u8]) -> Result<CheckpointDescription> {
	let decompressed = XzDecoder::new(data)
		.bytes()
		.collect::<::std::result::Result<Vec<_>, _>>()?;
	let unshuffled = unshuffle(&decompressed, 4);
	let desc: CheckpointDescription = deserialize(&unshuffled)
		.map_err(|e| FlowError::Serialization(format!("checkpoint decoding failed: {}", e)))?;
	if desc.version != CHECKPOINT_VERSION {
		return Err(FlowError::Serialization(format!(
			"checkpoint version {} is not supported (expected {})",
			desc.version, CHECKPOINT_VERSION
		)));
	}
	Ok(desc)
}

/// Shuffle f32 bytes so that all first bytes are contiguous etc.
/// Improves compression of floating point data.
fn shuffle(data: &[u8], stride: usize) -> Vec<u8> {
	let mut vec = Vec::with_capacity(data.len());
	for offset in 0..stride {
		for i in 0..(data.len() - offset + stride - 1) / stride {
			vec.push(data[offset + i * stride])
		}
	}
	debug_assert_eq!(vec.len(), data.len());
	vec
}

/// Inverts `shuffle()`
fn unshuffle(data: &[u8], stride: usize) -> Vec<u8> {
	let mut vec = vec![0; data.len()];
	let mut inc = 0;
	for offset in 0..stride {
		for i in 0..(data.len() - offset + stride - 1) / stride {
			vec[offset + i * stride] = data[inc];
			inc += 1;
		}
	}
	debug_assert_eq!(inc, data.len());
	vec
}

/// Answers yes/no questions for the run-startup decision. Split out so tests
/// and non-interactive runs do not touch stdin.
pub trait OperatorPrompt {
	fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// Reads `y`/`n` from stdin, reprompting on anything else.
pub struct StdinPrompt;

impl OperatorPrompt for StdinPrompt {
	fn confirm(&mut self, question: &str) -> Result<bool> {
		loop {
			print!("{} [y/n] ", question);
			std::io::stdout().flush()?;
			let mut line = String::new();
			std::io::stdin().read_line(&mut line)?;
			match line.trim() {
				"y" | "Y" => return Ok(true),
				"n" | "N" => return Ok(false),
				_ => {},
			}
		}
	}
}

/// How a run should begin after the snapshot directory has been inspected.
#[derive(Debug)]
pub enum StartDisposition {
	/// No usable snapshot; train from fresh parameters.
	Fresh,
	/// Resume from the newest snapshot.
	Resume(PathBuf, u64),
}

/// Owns one run's snapshot directory: discovery of existing checkpoints, the
/// resume-or-purge decision, and iteration-stamped saves.
pub struct CheckpointManager {
	dir: PathBuf,
}

impl CheckpointManager {
	/// `dir` is the run's snapshot directory, created if absent.
	pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
		let dir = dir.as_ref().to_path_buf();
		fs::create_dir_all(&dir)?;
		Ok(CheckpointManager { dir })
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	pub fn checkpoint_path(&self, iteration: u64) -> PathBuf {
		self.dir.join(format!(
			"{}{:0pad$}.{}",
			CHECKPOINT_PREFIX,
			iteration,
			CHECKPOINT_EXTENSION,
			pad = CHECKPOINT_PAD
		))
	}

	/// Every snapshot in the directory, sorted by iteration. Files that do not
	/// follow the naming scheme are ignored.
	pub fn list(&self) -> Result<Vec<(u64, PathBuf)>> {
		let mut found = Vec::new();
		for entry in fs::read_dir(&self.dir)? {
			let path = entry?.path();
			if let Some(iteration) = parse_checkpoint_name(&path) {
				found.push((iteration, path));
			}
		}
		found.sort_by_key(|&(iteration, _)| iteration);
		Ok(found)
	}

	pub fn latest(&self) -> Result<Option<(u64, PathBuf)>> {
		Ok(self.list()?.pop())
	}

	/// Startup decision: if snapshots exist, ask whether to resume from the
	/// newest one. Declining deletes every snapshot in the directory and
	/// starts fresh.
	pub fn prepare(&self, prompt: &mut dyn OperatorPrompt) -> Result<StartDisposition> {
		let existing = self.list()?;
		let (latest_iteration, latest_path) = match existing.last() {
			Some((iteration, path)) => (*iteration, path.clone()),
			None => return Ok(StartDisposition::Fresh),
		};
		let resume = prompt.confirm(&format!(
			"{} snapshot(s) found in {} (latest: iteration {}). Resume from it? \
			 Answering no deletes them and restarts.",
			existing.len(),
			self.dir.display(),
			latest_iteration
		))?;
		if resume {
			Ok(StartDisposition::Resume(latest_path, latest_iteration))
		} else {
			for (_, path) in existing {
				fs::remove_file(&path)?;
			}
			info!("purged snapshot directory {}", self.dir.display());
			Ok(StartDisposition::Fresh)
		}
	}

	/// Writes under a staging name and renames into place, so a crash
	/// mid-write never leaves a truncated file that `list` would pick up.
	pub fn save(&self, iteration: u64, parameters: Vec<ArrayD<f32>>) -> Result<PathBuf> {
		let path = self.checkpoint_path(iteration);
		let staging = path.with_extension(STAGING_EXTENSION);
		let bytes = checkpoint_to_bytes(CheckpointDescription::new(iteration, parameters))?;
		let mut file = File::create(&staging)
			.map_err(|e| FlowError::Storage(format!("{}: {}", staging.display(), e)))?;
		file.write_all(&bytes)
			.map_err(|e| FlowError::Storage(format!("{}: {}", staging.display(), e)))?;
		fs::rename(&staging, &path)
			.map_err(|e| FlowError::Storage(format!("{}: {}", path.display(), e)))?;
		Ok(path)
	}

	pub fn load<P: AsRef<Path>>(path: P) -> Result<CheckpointDescription> {
		let path = path.as_ref();
		let mut bytes = Vec::new();
		File::open(path)
			.map_err(|e| FlowError::FileNotFound(format!("{}: {}", path.display(), e)))?
			.read_to_end(&mut bytes)?;
		checkpoint_from_bytes(&bytes)
	}
}

fn parse_checkpoint_name(path: &Path) -> Option<u64> {
	if path.extension().and_then(|e| e.to_str()) != Some(CHECKPOINT_EXTENSION) {
		return None;
	}
	let stem = path.file_stem()?.to_str()?;
	let digits = stem.strip_prefix(CHECKPOINT_PREFIX)?;
	digits.parse().ok()
}

#[cfg(test)]
mod tests {
	use super::*;
	use ndarray::{ArrayD, IxDyn};

	struct Scripted(Vec<bool>);

	impl OperatorPrompt for Scripted {
		fn confirm(&mut self, _question: &str) -> Result<bool> {
			Ok(self.0.remove(0))
		}
	}

	fn temp_dir(tag: &str) -> PathBuf {
		let dir = std::env::temp_dir().join(format!("msoe-ckpt-{}-{}", tag, std::process::id()));
		std::fs::remove_dir_all(&dir).ok();
		dir
	}

	fn some_params() -> Vec<ArrayD<f32>> {
		vec![
			ArrayD::from_shape_fn(IxDyn(&[3, 3, 1, 2]), |ix| (ix[0] + 2 * ix[1] + ix[3]) as f32 * 0.25),
			ArrayD::from_elem(IxDyn(&[2]), -1.5),
		]
	}

	#[test]
	fn bytes_round_trip_bit_for_bit() {
		let desc = CheckpointDescription::new(420, some_params());
		let saved_at = desc.saved_at.clone();
		let bytes = checkpoint_to_bytes(desc).unwrap();
		let back = checkpoint_from_bytes(&bytes).unwrap();
		assert_eq!(back.iteration, 420);
		assert_eq!(back.saved_at, saved_at);
		assert_eq!(back.parameters, some_params());
	}

	#[test]
	fn unsupported_version_is_rejected() {
		let mut desc = CheckpointDescription::new(1, some_params());
		desc.version = CHECKPOINT_VERSION + 1;
		let bytes = checkpoint_to_bytes(desc).unwrap();
		assert!(checkpoint_from_bytes(&bytes).is_err());
	}

	#[test]
	fn file_names_sort_numerically() {
		let dir = temp_dir("names");
		let manager = CheckpointManager::new(&dir).unwrap();
		let name = manager.checkpoint_path(20);
		assert!(name.to_str().unwrap().ends_with("iter_0000000000000020.msoe"));
		for &i in &[100, 20, 9] {
			manager.save(i, some_params()).unwrap();
		}
		let listed: Vec<u64> = manager.list().unwrap().into_iter().map(|(i, _)| i).collect();
		assert_eq!(listed, vec![9, 20, 100]);
		assert_eq!(manager.latest().unwrap().unwrap().0, 100);
		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn interrupted_save_leaves_no_usable_looking_file() {
		let dir = temp_dir("staging");
		let manager = CheckpointManager::new(&dir).unwrap();
		manager.save(7, some_params()).unwrap();
		// a stray staging file from a killed process is invisible to discovery
		std::fs::write(manager.checkpoint_path(9).with_extension(STAGING_EXTENSION), b"junk").unwrap();
		let listed: Vec<u64> = manager.list().unwrap().into_iter().map(|(i, _)| i).collect();
		assert_eq!(listed, vec![7]);
		// and a completed save cleans its staging file up
		assert!(!manager.checkpoint_path(7).with_extension(STAGING_EXTENSION).exists());
		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn prepare_resumes_from_latest_when_confirmed() {
		let dir = temp_dir("resume");
		let manager = CheckpointManager::new(&dir).unwrap();
		manager.save(40, some_params()).unwrap();
		manager.save(60, some_params()).unwrap();
		match manager.prepare(&mut Scripted(vec![true])).unwrap() {
			StartDisposition::Resume(path, iteration) => {
				assert_eq!(iteration, 60);
				let desc = CheckpointManager::load(&path).unwrap();
				assert_eq!(desc.iteration, 60);
			},
			other => panic!("expected resume, got {:?}", other),
		}
		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn prepare_purges_when_declined() {
		let dir = temp_dir("purge");
		let manager = CheckpointManager::new(&dir).unwrap();
		manager.save(40, some_params()).unwrap();
		match manager.prepare(&mut Scripted(vec![false])).unwrap() {
			StartDisposition::Fresh => {},
			other => panic!("expected fresh start, got {:?}", other),
		}
		assert!(manager.list().unwrap().is_empty());
		// and a second prepare on the now-empty dir never prompts
		match manager.prepare(&mut Scripted(vec![])).unwrap() {
			StartDisposition::Fresh => {},
			other => panic!("expected fresh start, got {:?}", other),
		}
		std::fs::remove_dir_all(&dir).ok();
	}
}
