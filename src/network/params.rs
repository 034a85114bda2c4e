use crate::error::{FlowError, Result};
use ndarray::{Array4, ArrayD, ArrayViewD, IxDyn};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;

/// Dense 2-component motion field, `[batch, h, w, 2]`.
pub type MotionField = Array4<f32>;

/// A batch of temporally adjacent frame pairs, both `[batch, h, w, c]`.
///
/// The temporal extent of 2 is fixed by construction; the constructor enforces
/// that both frames agree on every dimension.
#[derive(Debug, Clone)]
pub struct FrameStack {
	pub prev: Array4<f32>,
	pub next: Array4<f32>,
}

impl FrameStack {
	pub fn new(prev: Array4<f32>, next: Array4<f32>) -> Result<Self> {
		if prev.dim() != next.dim() {
			return Err(FlowError::ShapeMismatch(format!(
				"frame pair shapes differ: {:?} vs {:?}",
				prev.dim(),
				next.dim()
			)));
		}
		Ok(FrameStack { prev, next })
	}

	pub fn batch(&self) -> usize {
		self.prev.dim().0
	}

	pub fn height(&self) -> usize {
		self.prev.dim().1
	}

	pub fn width(&self) -> usize {
		self.prev.dim().2
	}

	pub fn channels(&self) -> usize {
		self.prev.dim().3
	}

	/// Owned copy of the batch rows in `range`, used to chunk the validation set.
	pub fn slice_batch(&self, start: usize, end: usize) -> FrameStack {
		FrameStack {
			prev: self.prev.slice(ndarray::s![start..end, .., .., ..]).to_owned(),
			next: self.next.slice(ndarray::s![start..end, .., .., ..]).to_owned(),
		}
	}
}

/// Identifies one learnable tensor inside a [`ParamSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamId(pub(crate) usize);

/// Indexed registry of learnable tensors and their gradient accumulators.
///
/// Weight tying is structural: levels that share a cell hold the same
/// `ParamId`s, so there is exactly one tensor and one gradient buffer no
/// matter how many pyramid levels reference it.
#[derive(Debug, Clone)]
pub struct ParamSet {
	values: Vec<ArrayD<f32>>,
	grads: Vec<ArrayD<f32>>,
	names: Vec<String>,
	/// Ids whose tensors receive the L2 weight penalty (conv weights, not biases).
	regularized: Vec<ParamId>,
}

impl ParamSet {
	pub fn new() -> Self {
		ParamSet {
			values: Vec::new(),
			grads: Vec::new(),
			names: Vec::new(),
			regularized: Vec::new(),
		}
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	pub fn register(&mut self, name: &str, value: ArrayD<f32>, regularized: bool) -> ParamId {
		let id = ParamId(self.values.len());
		self.grads.push(ArrayD::zeros(value.raw_dim()));
		self.values.push(value);
		self.names.push(name.to_string());
		if regularized {
			self.regularized.push(id);
		}
		id
	}

	pub fn value(&self, id: ParamId) -> ArrayViewD<f32> {
		self.values[id.0].view()
	}

	pub fn name(&self, id: ParamId) -> &str {
		&self.names[id.0]
	}

	pub fn accumulate_grad(&mut self, id: ParamId, grad: &ArrayD<f32>) {
		self.grads[id.0] += grad;
	}

	pub fn grad(&self, id: ParamId) -> ArrayViewD<f32> {
		self.grads[id.0].view()
	}

	pub fn zero_grads(&mut self) {
		for g in &mut self.grads {
			g.fill(0.0);
		}
	}

	pub fn ids(&self) -> impl Iterator<Item = ParamId> {
		(0..self.values.len()).map(ParamId)
	}

	/// L2 penalty over every regularized tensor, and its gradient contribution.
	pub fn weight_penalty(&mut self, decay: f32) -> f32 {
		let mut penalty = 0.0;
		for &ParamId(i) in &self.regularized {
			penalty += self.values[i].mapv(|w| w * w).sum();
			let scaled = self.values[i].mapv(|w| 2.0 * decay * w);
			self.grads[i] += &scaled;
		}
		penalty * decay
	}

	pub(crate) fn apply<F: FnMut(&mut ArrayD<f32>, &ArrayD<f32>)>(&mut self, mut f: F) {
		for (v, g) in self.values.iter_mut().zip(self.grads.iter()) {
			f(v, g);
		}
	}

	/// Snapshot of every tensor, in registration order.
	pub fn to_arrays(&self) -> Vec<ArrayD<f32>> {
		self.values.clone()
	}

	/// Replaces every tensor from a checkpoint snapshot. Counts and shapes must match.
	pub fn load_arrays(&mut self, arrays: Vec<ArrayD<f32>>) -> Result<()> {
		if arrays.len() != self.values.len() {
			return Err(FlowError::ShapeMismatch(format!(
				"checkpoint holds {} parameter tensors, network expects {}",
				arrays.len(),
				self.values.len()
			)));
		}
		for (i, arr) in arrays.into_iter().enumerate() {
			if arr.shape() != self.values[i].shape() {
				return Err(FlowError::ShapeMismatch(format!(
					"parameter '{}': checkpoint shape {:?} does not match expected {:?}",
					self.names[i],
					arr.shape(),
					self.values[i].shape()
				)));
			}
			self.values[i] = arr;
		}
		Ok(())
	}
}

impl Default for ParamSet {
	fn default() -> Self {
		Self::new()
	}
}

/// Xavier-uniform initialisation for a convolution weight tensor
/// `[k, k, c_in, c_out]` (fan counts include the kernel area).
pub fn xavier_conv<R: Rng>(rng: &mut R, shape: &[usize]) -> ArrayD<f32> {
	let kernel_area: usize = shape[..shape.len() - 2].iter().product();
	let fan_in = (shape[shape.len() - 2] * kernel_area) as f32;
	let fan_out = (shape[shape.len() - 1] * kernel_area) as f32;
	let limit = (6.0 / (fan_in + fan_out)).sqrt();
	let dist = Uniform::new(-limit, limit);
	ArrayD::from_shape_fn(IxDyn(shape), |_| dist.sample(rng))
}
