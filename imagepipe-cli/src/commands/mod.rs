//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (path, show, init)
//! - [`data`] - Raw byte fetch with progress
//! - [`fetch`] - Image loading through the pipeline
//! - [`inspect`] - Disk cache listing

pub mod common;
pub mod config;
pub mod data;
pub mod fetch;
pub mod inspect;
