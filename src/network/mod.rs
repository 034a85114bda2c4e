pub mod cell;
pub mod params;
pub mod pyramid;

pub use self::cell::{CellParamIds, MotionFeatureCell};
pub use self::params::{FrameStack, MotionField, ParamSet};
pub use self::pyramid::{PyramidCache, PyramidComposer, PyramidParams};
