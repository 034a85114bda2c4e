//! Adam optimizer operating over the whole parameter registry at once.

use crate::constants::training::{ADAM_BETA1, ADAM_BETA2, ADAM_EPSILON};
use crate::network::ParamSet;
use ndarray::ArrayD;

/// Adam with bias-corrected first and second moment estimates. Moment buffers
/// are allocated lazily on the first step so the optimizer can be built before
/// the registry is populated.
#[derive(Debug, Clone)]
pub struct Adam {
	learning_rate: f32,
	beta1: f32,
	beta2: f32,
	epsilon: f32,
	m: Vec<ArrayD<f32>>,
	v: Vec<ArrayD<f32>>,
	step: u64,
}

impl Adam {
	pub fn new(learning_rate: f32) -> Self {
		Adam {
			learning_rate,
			beta1: ADAM_BETA1,
			beta2: ADAM_BETA2,
			epsilon: ADAM_EPSILON,
			m: Vec::new(),
			v: Vec::new(),
			step: 0,
		}
	}

	pub fn learning_rate(&self) -> f32 {
		self.learning_rate
	}

	pub fn steps_taken(&self) -> u64 {
		self.step
	}

	/// Applies one update from the gradients currently accumulated in `params`.
	/// Gradients are left untouched; the caller zeroes them per iteration.
	pub fn step(&mut self, params: &mut ParamSet) {
		self.step += 1;
		let bias1 = 1.0 - self.beta1.powi(self.step as i32);
		let bias2 = 1.0 - self.beta2.powi(self.step as i32);
		let lr = self.learning_rate;
		let (beta1, beta2, eps) = (self.beta1, self.beta2, self.epsilon);

		let (m, v) = (&mut self.m, &mut self.v);
		let mut index = 0;
		params.apply(|value, grad| {
			if m.len() <= index {
				m.push(ArrayD::zeros(value.raw_dim()));
				v.push(ArrayD::zeros(value.raw_dim()));
			}
			let m_t = &mut m[index];
			let v_t = &mut v[index];
			azip_update(value, grad, m_t, v_t, beta1, beta2, bias1, bias2, lr, eps);
			index += 1;
		});
	}

	/// Drops the moment estimates and step counter, as after loading a
	/// checkpoint that does not carry optimizer state.
	pub fn reset(&mut self) {
		self.m.clear();
		self.v.clear();
		self.step = 0;
	}
}

#[allow(clippy::too_many_arguments)]
fn azip_update(
	value: &mut ArrayD<f32>,
	grad: &ArrayD<f32>,
	m: &mut ArrayD<f32>,
	v: &mut ArrayD<f32>,
	beta1: f32,
	beta2: f32,
	bias1: f32,
	bias2: f32,
	lr: f32,
	eps: f32,
) {
	ndarray::Zip::from(value)
		.and(grad)
		.and(m)
		.and(v)
		.for_each(|w, &g, m_i, v_i| {
			*m_i = beta1 * *m_i + (1.0 - beta1) * g;
			*v_i = beta2 * *v_i + (1.0 - beta2) * g * g;
			let m_hat = *m_i / bias1;
			let v_hat = *v_i / bias2;
			*w -= lr * m_hat / (v_hat.sqrt() + eps);
		});
}

#[cfg(test)]
mod tests {
	use super::*;
	use ndarray::{ArrayD, IxDyn};

	fn single_param(value: f32) -> ParamSet {
		let mut set = ParamSet::new();
		set.register("w", ArrayD::from_elem(IxDyn(&[1]), value), false);
		set
	}

	#[test]
	fn first_step_moves_against_gradient_by_roughly_lr() {
		let mut set = single_param(1.0);
		let id = set.ids().next().unwrap();
		let g = ArrayD::from_elem(IxDyn(&[1]), 0.5);
		set.accumulate_grad(id, &g);

		let mut adam = Adam::new(0.01);
		adam.step(&mut set);
		// with bias correction the first step is ~lr * sign(g)
		let w = set.value(id)[[0]];
		assert!(w < 1.0);
		assert!((1.0 - w - 0.01).abs() < 1e-4);
	}

	#[test]
	fn zero_gradient_leaves_parameters_unchanged() {
		let mut set = single_param(2.5);
		let id = set.ids().next().unwrap();
		let mut adam = Adam::new(0.1);
		adam.step(&mut set);
		assert!((set.value(id)[[0]] - 2.5).abs() < 1e-6);
	}

	#[test]
	fn reset_clears_moment_history() {
		let mut set = single_param(1.0);
		let id = set.ids().next().unwrap();
		let g = ArrayD::from_elem(IxDyn(&[1]), 1.0);

		let mut adam = Adam::new(0.01);
		set.accumulate_grad(id, &g);
		adam.step(&mut set);
		assert_eq!(adam.steps_taken(), 1);

		adam.reset();
		assert_eq!(adam.steps_taken(), 0);

		// a fresh optimizer and the reset one take the same next step
		let mut fresh = Adam::new(0.01);
		let mut a = set.clone();
		let mut b = set.clone();
		adam.step(&mut a);
		fresh.step(&mut b);
		let ai = a.ids().next().unwrap();
		let bi = b.ids().next().unwrap();
		assert!((a.value(ai)[[0]] - b.value(bi)[[0]]).abs() < 1e-7);
	}
}
