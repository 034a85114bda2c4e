//! Background batch production. Loader threads sample with replacement from a
//! shared [`SampleSource`], collate full batches, and push them into a bounded
//! queue so the training loop never waits on disk unless every loader is
//! behind.

use crate::dataset::{collate, SampleSource};
use crate::error::{FlowError, Result};
use crate::network::{FrameStack, MotionField};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

type Batch = (FrameStack, MotionField);

pub struct BatchProducer {
	receiver: Receiver<Result<Batch>>,
	stop: Arc<AtomicBool>,
	workers: Vec<JoinHandle<()>>,
}

impl BatchProducer {
	/// Starts `num_threads` loader threads. The queue holds at most
	/// `batch_size * num_threads` pending batches worth of backpressure.
	pub fn start(
		source: Arc<dyn SampleSource>,
		batch_size: usize,
		num_threads: usize,
		seed: u64,
	) -> Result<BatchProducer> {
		if batch_size == 0 || num_threads == 0 {
			return Err(FlowError::Config(
				"batch size and loader thread count must be positive".to_string(),
			));
		}
		if source.is_empty() {
			return Err(FlowError::Config("sample source is empty".to_string()));
		}
		let (sender, receiver) = sync_channel(batch_size * num_threads);
		let stop = Arc::new(AtomicBool::new(false));
		let workers = (0..num_threads)
			.map(|worker| {
				let source = Arc::clone(&source);
				let sender = sender.clone();
				let stop = Arc::clone(&stop);
				let rng = StdRng::seed_from_u64(seed.wrapping_add(worker as u64));
				std::thread::Builder::new()
					.name(format!("loader-{}", worker))
					.spawn(move || loader_thread(source, sender, stop, rng, batch_size))
					.map_err(FlowError::Io)
			})
			.collect::<Result<Vec<_>>>()?;
		Ok(BatchProducer {
			receiver,
			stop,
			workers,
		})
	}

	/// Blocks until a batch is ready. Sample-load failures inside the workers
	/// surface here rather than killing the loader thread silently.
	pub fn next_batch(&self) -> Result<Batch> {
		self.receiver
			.recv()
			.map_err(|_| FlowError::Training("all loader threads have exited".to_string()))?
	}
}

impl Drop for BatchProducer {
	fn drop(&mut self) {
		self.stop.store(true, Ordering::SeqCst);
		// drain so senders blocked on a full queue can observe the flag
		while self.receiver.try_recv().is_ok() {}
		for worker in self.workers.drain(..) {
			worker.join().ok();
		}
	}
}

fn loader_thread(
	source: Arc<dyn SampleSource>,
	sender: SyncSender<Result<Batch>>,
	stop: Arc<AtomicBool>,
	mut rng: StdRng,
	batch_size: usize,
) {
	while !stop.load(Ordering::SeqCst) {
		let batch = produce_batch(&*source, &mut rng, batch_size);
		let failed = batch.is_err();
		let mut pending = batch;
		// try_send in a backoff loop so shutdown is never blocked on a full queue
		loop {
			match sender.try_send(pending) {
				Ok(()) => break,
				Err(TrySendError::Full(b)) => {
					if stop.load(Ordering::SeqCst) {
						return;
					}
					pending = b;
					std::thread::sleep(std::time::Duration::from_millis(5));
				},
				Err(TrySendError::Disconnected(_)) => return,
			}
		}
		if failed {
			return;
		}
	}
}

fn produce_batch(source: &dyn SampleSource, rng: &mut StdRng, batch_size: usize) -> Result<Batch> {
	let mut samples = Vec::with_capacity(batch_size);
	for _ in 0..batch_size {
		let index = rng.gen_range(0..source.len());
		samples.push(source.sample(index)?);
	}
	collate(&samples)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dataset::FlowSample;
	use ndarray::Array3;

	struct Constant {
		count: usize,
		fail_at: Option<usize>,
	}

	impl SampleSource for Constant {
		fn len(&self) -> usize {
			self.count
		}

		fn sample(&self, index: usize) -> Result<FlowSample> {
			if Some(index) == self.fail_at {
				return Err(FlowError::Parse("corrupt sample".to_string()));
			}
			FlowSample::new(
				Array3::from_elem((8, 8, 1), index as f32),
				Array3::from_elem((8, 8, 1), index as f32),
				Array3::zeros((8, 8, 2)),
			)
		}
	}

	#[test]
	fn produces_full_batches() {
		let source = Arc::new(Constant { count: 10, fail_at: None });
		let producer = BatchProducer::start(source, 4, 2, 1).unwrap();
		for _ in 0..5 {
			let (frames, flow) = producer.next_batch().unwrap();
			assert_eq!(frames.prev.dim(), (4, 8, 8, 1));
			assert_eq!(flow.dim(), (4, 8, 8, 2));
		}
	}

	#[test]
	fn rejects_empty_source_and_zero_batch() {
		let empty = Arc::new(Constant { count: 0, fail_at: None });
		assert!(BatchProducer::start(empty, 4, 2, 1).is_err());
		let source = Arc::new(Constant { count: 4, fail_at: None });
		assert!(BatchProducer::start(source, 0, 2, 1).is_err());
	}

	#[test]
	fn sample_failures_reach_the_consumer() {
		// every index fails, so the first received batch must be an error
		let source = Arc::new(Constant {
			count: 1,
			fail_at: Some(0),
		});
		let producer = BatchProducer::start(source, 2, 1, 1).unwrap();
		assert!(producer.next_batch().is_err());
	}

	#[test]
	fn drop_stops_workers_promptly() {
		let source = Arc::new(Constant { count: 10, fail_at: None });
		let producer = BatchProducer::start(source, 2, 3, 7).unwrap();
		producer.next_batch().unwrap();
		drop(producer); // joins without hanging
	}
}
