//! X-ray detector acquisition and correction core: drives a detector through
//! an integration/exposure cycle, pipes each raw frame through a
//! configurable correction pipeline, and maintains the dark/flat/bad-pixel
//! calibration store that pipeline feeds from.

pub mod beam;
pub mod calibration;
pub mod capture_sequence;
pub mod config;
pub mod controller;
pub mod detector;
pub mod error;
pub mod frame;
pub mod frame_store;
pub mod pipeline;

pub use capture_sequence::CaptureSequence;
pub use controller::{AcquisitionController, AcquisitionMode, FailReason};
pub use error::{AcqError, AppResult};
pub use frame::Frame;
pub use frame_store::FrameStore;
pub use pipeline::{default_stages, Pipeline, PipelineContext};
