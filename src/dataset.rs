//! Training data access: one trait for anything that can yield frame-pair /
//! ground-truth samples, a directory-backed implementation over image files
//! and `.flo` fields, and batch collation.

use crate::error::{FlowError, Result};
use crate::flow_io;
use crate::network::{FrameStack, MotionField};
use ndarray::{Array3, Array4, Axis};
use std::fs;
use std::path::{Path, PathBuf};

/// One training example before batching: a grayscale frame pair `[h, w, 1]`
/// and its ground-truth motion field `[h, w, 2]`.
#[derive(Debug, Clone)]
pub struct FlowSample {
	pub prev: Array3<f32>,
	pub next: Array3<f32>,
	pub flow: Array3<f32>,
}

impl FlowSample {
	pub fn new(prev: Array3<f32>, next: Array3<f32>, flow: Array3<f32>) -> Result<Self> {
		if prev.dim() != next.dim() {
			return Err(FlowError::ShapeMismatch(format!(
				"frame pair shapes differ: {:?} vs {:?}",
				prev.dim(),
				next.dim()
			)));
		}
		let (h, w, _) = prev.dim();
		let (fh, fw, fc) = flow.dim();
		if (fh, fw) != (h, w) || fc != 2 {
			return Err(FlowError::ShapeMismatch(format!(
				"flow shape {:?} does not match {}x{} frames",
				flow.dim(),
				h,
				w
			)));
		}
		Ok(FlowSample { prev, next, flow })
	}

	pub fn height(&self) -> usize {
		self.prev.dim().0
	}

	pub fn width(&self) -> usize {
		self.prev.dim().1
	}
}

/// Anything that can serve indexed flow samples. Implementations must be
/// shareable across loader threads.
pub trait SampleSource: Send + Sync {
	fn len(&self) -> usize;

	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn sample(&self, index: usize) -> Result<FlowSample>;
}

/// Stacks samples along a new batch axis. All samples must share dimensions.
pub fn collate(samples: &[FlowSample]) -> Result<(FrameStack, MotionField)> {
	let first = samples
		.first()
		.ok_or_else(|| FlowError::Config("cannot collate an empty batch".to_string()))?;
	let (h, w, c) = first.prev.dim();
	let batch = samples.len();
	let mut prev = Array4::<f32>::zeros((batch, h, w, c));
	let mut next = Array4::<f32>::zeros((batch, h, w, c));
	let mut flow = Array4::<f32>::zeros((batch, h, w, 2));
	for (i, sample) in samples.iter().enumerate() {
		if sample.prev.dim() != (h, w, c) {
			return Err(FlowError::ShapeMismatch(format!(
				"batch member {} has shape {:?}, expected {:?}",
				i,
				sample.prev.dim(),
				(h, w, c)
			)));
		}
		prev.index_axis_mut(Axis(0), i).assign(&sample.prev);
		next.index_axis_mut(Axis(0), i).assign(&sample.next);
		flow.index_axis_mut(Axis(0), i).assign(&sample.flow);
	}
	Ok((FrameStack::new(prev, next)?, flow))
}

/// Directory of FlyingChairs-style triples: `<stem>_img1.*`, `<stem>_img2.*`
/// and `<stem>_flow.flo`. Images are converted to single-channel luma in
/// `[0, 1]` on load.
pub struct FlowFolderSource {
	entries: Vec<SampleEntry>,
}

struct SampleEntry {
	img1: PathBuf,
	img2: PathBuf,
	flow: PathBuf,
}

const FLOW_SUFFIX: &str = "_flow.flo";
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "ppm", "jpg", "jpeg"];

impl FlowFolderSource {
	/// Scans `dir` for flow files and their sibling frame images. Triples with
	/// a missing frame are an error, not silently skipped.
	pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
		let dir = dir.as_ref();
		if !dir.is_dir() {
			return Err(FlowError::FileNotFound(format!(
				"data directory '{}' does not exist",
				dir.display()
			)));
		}
		let mut flow_files: Vec<PathBuf> = fs::read_dir(dir)?
			.filter_map(|entry| entry.ok().map(|e| e.path()))
			.filter(|p| {
				p.file_name()
					.and_then(|n| n.to_str())
					.map(|n| n.ends_with(FLOW_SUFFIX))
					.unwrap_or(false)
			})
			.collect();
		flow_files.sort();

		let mut entries = Vec::with_capacity(flow_files.len());
		for flow in flow_files {
			let name = flow
				.file_name()
				.and_then(|n| n.to_str())
				.ok_or_else(|| FlowError::Parse(format!("unreadable file name in {}", dir.display())))?;
			let stem = &name[..name.len() - FLOW_SUFFIX.len()];
			let img1 = find_frame(dir, stem, 1)?;
			let img2 = find_frame(dir, stem, 2)?;
			entries.push(SampleEntry { img1, img2, flow });
		}
		if entries.is_empty() {
			return Err(FlowError::Config(format!(
				"no *{} files found in '{}'",
				FLOW_SUFFIX,
				dir.display()
			)));
		}
		info!("found {} flow samples in {}", entries.len(), dir.display());
		Ok(FlowFolderSource { entries })
	}
}

fn find_frame(dir: &Path, stem: &str, index: usize) -> Result<PathBuf> {
	for ext in &IMAGE_EXTENSIONS {
		let candidate = dir.join(format!("{}_img{}.{}", stem, index, ext));
		if candidate.is_file() {
			return Ok(candidate);
		}
	}
	Err(FlowError::FileNotFound(format!(
		"frame {} for sample '{}' not found in {}",
		index,
		stem,
		dir.display()
	)))
}

/// Loads an image as `[h, w, 1]` luma values in `[0, 1]`.
pub fn load_luma<P: AsRef<Path>>(path: P) -> Result<Array3<f32>> {
	let img = image::open(path.as_ref())?.to_luma8();
	let (width, height) = img.dimensions();
	let data: Vec<f32> = img.into_raw().into_iter().map(|p| p as f32 / 255.0).collect();
	Array3::from_shape_vec((height as usize, width as usize, 1), data)
		.map_err(|e| FlowError::Parse(format!("image buffer: {}", e)))
}

impl SampleSource for FlowFolderSource {
	fn len(&self) -> usize {
		self.entries.len()
	}

	fn sample(&self, index: usize) -> Result<FlowSample> {
		let entry = self.entries.get(index).ok_or_else(|| {
			FlowError::Config(format!(
				"sample index {} out of range ({} samples)",
				index,
				self.entries.len()
			))
		})?;
		let prev = load_luma(&entry.img1)?;
		let next = load_luma(&entry.img2)?;
		let flow = flow_io::read_flo(&entry.flow)?;
		FlowSample::new(prev, next, flow)
	}
}

/// An entire held-out set loaded into memory, already collated, so validation
/// can slice fixed-size chunks out of it without re-reading files.
pub struct ValidationSet {
	pub frames: FrameStack,
	pub flow: MotionField,
}

impl ValidationSet {
	pub fn load(source: &dyn SampleSource) -> Result<Self> {
		let mut samples = Vec::with_capacity(source.len());
		for i in 0..source.len() {
			samples.push(source.sample(i)?);
		}
		let (frames, flow) = collate(&samples)?;
		Ok(ValidationSet { frames, flow })
	}

	pub fn len(&self) -> usize {
		self.frames.batch()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Chunk rows `[start, end)`, clamped to the set size.
	pub fn chunk(&self, start: usize, end: usize) -> (FrameStack, MotionField) {
		let end = end.min(self.len());
		let frames = self.frames.slice_batch(start, end);
		let flow = self.flow.slice(ndarray::s![start..end, .., .., ..]).to_owned();
		(frames, flow)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ndarray::Array3;

	fn sample(h: usize, w: usize, fill: f32) -> FlowSample {
		FlowSample::new(
			Array3::from_elem((h, w, 1), fill),
			Array3::from_elem((h, w, 1), fill + 0.1),
			Array3::from_elem((h, w, 2), fill * 2.0),
		)
		.unwrap()
	}

	struct InMemory(Vec<FlowSample>);

	impl SampleSource for InMemory {
		fn len(&self) -> usize {
			self.0.len()
		}

		fn sample(&self, index: usize) -> Result<FlowSample> {
			Ok(self.0[index].clone())
		}
	}

	#[test]
	fn sample_rejects_mismatched_flow() {
		let prev = Array3::zeros((4, 4, 1));
		let next = Array3::zeros((4, 4, 1));
		let flow = Array3::zeros((4, 5, 2));
		assert!(FlowSample::new(prev, next, flow).is_err());
	}

	#[test]
	fn collate_stacks_in_order() {
		let samples = vec![sample(4, 6, 0.0), sample(4, 6, 0.5), sample(4, 6, 1.0)];
		let (frames, flow) = collate(&samples).unwrap();
		assert_eq!(frames.prev.dim(), (3, 4, 6, 1));
		assert_eq!(flow.dim(), (3, 4, 6, 2));
		assert_eq!(frames.prev[[1, 0, 0, 0]], 0.5);
		assert_eq!(frames.next[[2, 0, 0, 0]], 1.1);
		assert_eq!(flow[[2, 3, 5, 1]], 2.0);
	}

	#[test]
	fn collate_rejects_ragged_batches() {
		let samples = vec![sample(4, 6, 0.0), sample(4, 7, 0.0)];
		assert!(collate(&samples).is_err());
		assert!(collate(&[]).is_err());
	}

	#[test]
	fn validation_set_chunks_cover_everything() {
		let source = InMemory(vec![sample(4, 4, 0.0); 5]);
		let set = ValidationSet::load(&source).unwrap();
		assert_eq!(set.len(), 5);
		let (frames, flow) = set.chunk(4, 8);
		assert_eq!(frames.batch(), 1);
		assert_eq!(flow.dim().0, 1);
	}

	#[test]
	fn missing_directory_is_reported() {
		assert!(FlowFolderSource::open("/nonexistent/flow/data").is_err());
	}
}
