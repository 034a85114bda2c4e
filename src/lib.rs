extern crate bincode;
extern crate byteorder;
extern crate chrono;
extern crate clap;
extern crate env_logger;
extern crate image;
extern crate indicatif;
#[macro_use]
extern crate log;
#[macro_use]
extern crate ndarray;
extern crate rand;
extern crate rayon;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate toml;
extern crate xz2;

pub mod cli;
pub mod commands;
pub mod config;
pub mod config_file;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod flow_io;
pub mod logging;
pub mod metrics;
pub mod network;
pub mod ops;
pub mod optimizer;
pub mod telemetry;
pub mod training;
pub mod validation;

pub use error::{FlowError, Result};
pub use network::{FrameStack, MotionField, ParamSet, PyramidComposer, PyramidParams};
