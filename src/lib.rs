//! Background removal for single images and directories, backed by
//! u2net-family ONNX models.

pub mod config;
pub mod errors;
pub mod logging;
pub mod model;
pub mod paths;
pub mod processor;
mod progress_tracker;
pub mod traits;

pub mod mocks;

pub use config::{Config, Mode};
pub use errors::{RemBgError, Result};
pub use model::{ModelName, OnnxBackgroundRemover};
pub use processor::{BackgroundRemovalProcessor, BatchSummary};
pub use traits::*;
