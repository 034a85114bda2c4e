use std::error::Error as StdError;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum FlowError {
	Io(io::Error),
	Image(image::ImageError),
	Parse(String),
	/// Fatal pre-flight configuration problems. Nothing runs after one of these.
	Config(String),
	/// Tensor shape disagreement at the offending operation.
	ShapeMismatch(String),
	/// Checkpoint storage problems. Recoverable for periodic saves,
	/// fatal when a resume or finalize explicitly names a checkpoint.
	Storage(String),
	Training(String),
	Validation(String),
	Serialization(String),
	FileNotFound(String),
}

impl fmt::Display for FlowError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			FlowError::Io(err) => write!(f, "IO error: {}", err),
			FlowError::Image(err) => write!(f, "Image decoding error: {}", err),
			FlowError::Parse(msg) => write!(f, "Parse error: {}", msg),
			FlowError::Config(msg) => write!(f, "Configuration error: {}", msg),
			FlowError::ShapeMismatch(msg) => write!(f, "Shape mismatch: {}", msg),
			FlowError::Storage(msg) => write!(f, "Storage error: {}", msg),
			FlowError::Training(msg) => write!(f, "Training error: {}", msg),
			FlowError::Validation(msg) => write!(f, "Validation error: {}", msg),
			FlowError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
			FlowError::FileNotFound(msg) => write!(f, "File not found: {}", msg),
		}
	}
}

impl StdError for FlowError {}

impl From<io::Error> for FlowError {
	fn from(err: io::Error) -> Self {
		FlowError::Io(err)
	}
}

impl From<image::ImageError> for FlowError {
	fn from(err: image::ImageError) -> Self {
		FlowError::Image(err)
	}
}

impl From<ndarray::ShapeError> for FlowError {
	fn from(err: ndarray::ShapeError) -> Self {
		FlowError::ShapeMismatch(err.to_string())
	}
}

pub type Result<T> = std::result::Result<T, FlowError>;
