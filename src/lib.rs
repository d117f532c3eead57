//! WebSDL visualization - incremental time-series plotting for the WebSDL portal
//!
//! This library exposes the core modules for testing and reuse.

pub mod config;
pub mod dataloader;
pub mod error;
pub mod plotting;
pub mod services;
