//! pluginmaster library exports
//!
//! Aggregates plugin listings from many sources and pins their download
//! links to the state that matches a region's platform version.

pub mod config;
pub mod delay;
pub mod error;
pub mod fetch;
pub mod history;
pub mod manifest;
pub mod pipeline;
pub mod repo;
pub mod rewrite;
pub mod rules;
pub mod schedule;
pub mod url;

pub use error::{Error, Result, TransportError};
pub use manifest::{Manifest, ManifestPatch};
