#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

mod worker;

pub mod backend;
pub mod error;
pub mod frame;
pub mod job;
pub mod optimizer;
pub mod orchestrator;
pub mod settings;
pub mod status;
pub mod strategy;

#[doc(inline)]
pub use backend::{BackendFactory, BackendKind, ContainerBackend, DefaultBackendFactory, OpenParams};
#[doc(inline)]
pub use error::{Error, FaultKind, JobFault, Result};
#[doc(inline)]
pub use frame::{Format, FrameInfo, FrameSet, Rect};
#[doc(inline)]
pub use job::{CancellationToken, EncodingJob, JobId, JobStatus};
#[doc(inline)]
pub use optimizer::DeltaFrameOptimizer;
#[doc(inline)]
pub use orchestrator::JobOrchestrator;
#[doc(inline)]
pub use settings::{EncoderSettings, GifEncoderKind, Rgb};
#[doc(inline)]
pub use status::{NullObserver, StatusEvent, StatusObserver, StatusReporter};
#[doc(inline)]
pub use strategy::EncodingStrategy;
