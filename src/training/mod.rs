pub mod checkpoint;
pub mod data_loader;
pub mod trainer;

pub use self::checkpoint::{CheckpointManager, OperatorPrompt, StartDisposition, StdinPrompt};
pub use self::data_loader::BatchProducer;
pub use self::trainer::TrainingLoop;
