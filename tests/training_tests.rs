use msoe_rust::config::TrainingConfig;
use msoe_rust::dataset::{FlowSample, SampleSource, ValidationSet};
use msoe_rust::telemetry::{NullSink, TelemetrySink};
use msoe_rust::training::{BatchProducer, CheckpointManager, TrainingLoop};
use msoe_rust::Result;
use ndarray::Array3;
use std::path::PathBuf;
use std::sync::Arc;

/// Deterministic in-memory samples: shifted ramps with constant unit flow.
struct Ramps;

impl SampleSource for Ramps {
    fn len(&self) -> usize {
        6
    }

    fn sample(&self, index: usize) -> Result<FlowSample> {
        let shade = index as f32 * 0.05;
        FlowSample::new(
            Array3::from_shape_fn((20, 20, 1), |(y, x, _)| shade + (y + x) as f32 * 0.01),
            Array3::from_shape_fn((20, 20, 1), |(y, x, _)| shade + (y + x + 1) as f32 * 0.01),
            Array3::from_elem((20, 20, 2), 1.0),
        )
    }
}

fn config(iterations: u64) -> TrainingConfig {
    TrainingConfig::builder()
        .iterations(iterations)
        .batch_size(2)
        .num_scales(1)
        .num_threads(1)
        .print_interval(1000)
        .validation_interval(1000)
        .snapshot_interval(2)
        .seed(17)
        .build()
}

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("msoe-it-train-{}-{}", tag, std::process::id()));
    std::fs::remove_dir_all(&dir).ok();
    dir
}

#[test]
fn test_run_snapshots_on_cadence_and_at_the_end() {
    let dir = temp_dir("cadence");
    let checkpoints = CheckpointManager::new(&dir).unwrap();
    let producer = BatchProducer::start(Arc::new(Ramps), 2, 1, 1).unwrap();
    let mut looper = TrainingLoop::new(config(5)).unwrap();
    looper.run(&producer, None, &checkpoints, &mut NullSink).unwrap();

    let iterations: Vec<u64> = checkpoints.list().unwrap().into_iter().map(|(i, _)| i).collect();
    // cadence saves after steps 2 and 4, plus the final state after step 5
    assert_eq!(iterations, vec![2, 4, 5]);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_resume_starts_after_the_saved_iteration_with_saved_tensors() {
    let dir = temp_dir("resume");
    let checkpoints = CheckpointManager::new(&dir).unwrap();
    let producer = BatchProducer::start(Arc::new(Ramps), 2, 1, 1).unwrap();
    let mut looper = TrainingLoop::new(config(4)).unwrap();
    looper.run(&producer, None, &checkpoints, &mut NullSink).unwrap();

    let (iteration, path) = checkpoints.latest().unwrap().unwrap();
    let desc = CheckpointManager::load(&path).unwrap();
    let saved = desc.parameters.clone();

    let mut resumed = TrainingLoop::new(config(4)).unwrap();
    resumed.restore(desc).unwrap();
    // the checkpoint counts completed steps, which is the next 0-based iteration
    assert_eq!(resumed.start_iteration(), iteration);
    assert_eq!(resumed.params().set.to_arrays(), saved);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_validation_pass_covers_the_whole_set() {
    struct CountingSink {
        validations: usize,
    }

    impl TelemetrySink for CountingSink {
        fn training_loss(&mut self, _iteration: u64, _loss: f32) {}
        fn validation(&mut self, _iteration: u64, _report: &msoe_rust::metrics::ValidationReport) {
            self.validations += 1;
        }
    }

    let set = ValidationSet::load(&Ramps).unwrap();
    assert_eq!(set.len(), 6);

    let dir = temp_dir("valpass");
    let checkpoints = CheckpointManager::new(&dir).unwrap();
    let producer = BatchProducer::start(Arc::new(Ramps), 2, 1, 1).unwrap();
    let mut cfg = config(4);
    cfg.validation_interval = 2;
    let mut looper = TrainingLoop::new(cfg).unwrap();
    let mut sink = CountingSink { validations: 0 };
    looper.run(&producer, Some(&set), &checkpoints, &mut sink).unwrap();
    // validation fires after steps 2 and 4
    assert_eq!(sink.validations, 2);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_loss_decreases_over_a_short_run() {
    let producer = BatchProducer::start(Arc::new(Ramps), 2, 1, 1).unwrap();

    struct Recorder {
        losses: Vec<f32>,
    }

    impl TelemetrySink for Recorder {
        fn training_loss(&mut self, _iteration: u64, loss: f32) {
            self.losses.push(loss);
        }
        fn validation(&mut self, _iteration: u64, _report: &msoe_rust::metrics::ValidationReport) {}
    }

    let dir = temp_dir("descent");
    let checkpoints = CheckpointManager::new(&dir).unwrap();
    let mut cfg = config(40);
    cfg.snapshot_interval = 1000;
    let mut looper = TrainingLoop::new(cfg).unwrap();
    let mut recorder = Recorder { losses: Vec::new() };
    looper.run(&producer, None, &checkpoints, &mut recorder).unwrap();

    assert_eq!(recorder.losses.len(), 40);
    let early: f32 = recorder.losses[..5].iter().sum::<f32>() / 5.0;
    let late: f32 = recorder.losses[35..].iter().sum::<f32>() / 5.0;
    assert!(late < early, "mean loss did not drop: {} -> {}", early, late);
    std::fs::remove_dir_all(&dir).ok();
}
