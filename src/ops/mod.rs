//! Tensor primitives the network is built from: SAME-padding convolution,
//! temporal-pair pooling and resampling, all on `[batch, height, width, channel]`
//! ndarray tensors.

pub mod conv;
pub mod pool;
pub mod resample;

pub use self::conv::{conv2d_same, conv2d_same_backward, ConvGrads};
pub use self::pool::{temporal_avg_pool, temporal_avg_pool_backward};
pub use self::resample::{bilinear_resize, bilinear_resize_adjoint, blur_downsample, gaussian_kernel};
