//! # Transfer Harness
//!
//! Fine-tunes ImageNet-style ResNet backbones on a folder-per-class image
//! dataset with the Burn ML framework. Every run keeps a plain-text report,
//! a scalar series, a best-so-far checkpoint, and is cleaned up when it
//! fails or never improves.
//!
//! ## Modules
//!
//! - [`experiment`]: Report log, artifact layout, scalar series, cleanup
//! - [`data`]: Class-folder scanning, train/valid split, image transforms, batching
//! - [`model`]: ResNet backbones and the replaceable classifier head
//! - [`optim`]: Optimizer and learning-rate scheduler selection
//! - [`training`]: Epoch loop, burn training session, accuracy, cancellation
//! - [`checkpoint`]: Weight persistence with metadata
//! - [`config`]: TOML configuration loading and validation
//! - [`error`]: Structured error types

#![recursion_limit = "256"]

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod experiment;
pub mod model;
pub mod optim;
pub mod training;
