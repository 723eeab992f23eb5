//! Configuration module for BlobSync
//!
//! Provides executor tuning loaded from defaults, the environment or JSON.

mod settings;

pub use settings::*;
