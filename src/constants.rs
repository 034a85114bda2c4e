pub mod network {
	/// Number of frames in an input pair. The stage-1 convolution spans both.
	pub const TEMPORAL_EXTENT: usize = 2;
	pub const DEFAULT_INPUT_CHANNELS: usize = 1;
	pub const CONV1_KERNEL: usize = 11;
	pub const CONV1_FILTERS: usize = 32;
	pub const POOL_WINDOW: usize = 5;
	pub const CONV2_FILTERS: usize = 64;
	pub const CONV3_KERNEL: usize = 5;
	pub const CONV3_FILTERS: usize = 128;
	pub const FUSE_KERNEL: usize = 3;
	pub const FUSE_FILTERS: usize = 64;
	pub const FLOW_CHANNELS: usize = 2;
	/// Smallest spatial extent a cell accepts: stage-1 receptive field plus pooling margin.
	pub const MIN_CELL_INPUT: usize = CONV1_KERNEL + POOL_WINDOW - 1;
	/// Border lost to VALID pooling, per side total.
	pub const POOL_MARGIN: usize = POOL_WINDOW - 1;
	pub const L1_NORM_EPSILON: f32 = 1e-12;
	pub const CONTRAST_NORM_EPSILON: f32 = 1e-6;
}

pub mod pyramid {
	pub const DEFAULT_NUM_SCALES: usize = 5;
	pub const BLUR_KERNEL: usize = 5;
	pub const BLUR_SIGMA: f32 = 2.0;
	pub const DOWNSAMPLE_STRIDE: usize = 2;
}

pub mod training {
	pub const DEFAULT_LEARNING_RATE: f32 = 1.2e-2;
	pub const DEFAULT_BATCH_SIZE: usize = 4;
	pub const DEFAULT_ITERATIONS: u64 = 600_000;
	pub const DEFAULT_PRINT_INTERVAL: u64 = 10;
	pub const DEFAULT_VALIDATION_INTERVAL: u64 = 50;
	pub const DEFAULT_SNAPSHOT_INTERVAL: u64 = 20;
	pub const DEFAULT_NUM_THREADS: usize = 6;
	pub const ADAM_BETA1: f32 = 0.9;
	pub const ADAM_BETA2: f32 = 0.999;
	pub const ADAM_EPSILON: f32 = 1e-8;
	/// L2 penalty applied to every convolution weight tensor.
	pub const WEIGHT_DECAY: f32 = 1e-5;
}

pub mod metrics {
	pub const NUM_SEGMENTS: usize = 8;
	/// Upper speed bound (px/frame) of each bucket except the open-ended last.
	pub const SPEED_THRESHOLDS: [f32; NUM_SEGMENTS - 1] = [1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0];
}

pub mod file {
	pub const CHECKPOINT_EXTENSION: &str = "msoe";
	pub const CHECKPOINT_PREFIX: &str = "iter_";
	/// Zero padding of the iteration number in checkpoint file names.
	pub const CHECKPOINT_PAD: usize = 16;
	pub const SNAPSHOT_ROOT: &str = "snapshots";
	pub const LOG_ROOT: &str = "logs";
	pub const SCALARS_FILE: &str = "scalars.csv";
	pub const CHECKPOINT_VERSION: u32 = 1;
}
