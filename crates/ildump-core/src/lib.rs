//! # ildump-core
//!
//! A library for reconstructing C#-like declarations from resolved IL2CPP
//! metadata.
//!
//! This crate provides the core functionality for:
//! - Decoding the resolved metadata model handed over by the ingestion stage
//! - Categorizing type members into fields, properties, events and methods
//! - Rendering one pseudo-source artifact per module, annotated with field
//!   offsets and method addresses
//!
//! ## Architecture
//!
//! - [`model`]: Resolved metadata model and its protobuf interchange form
//! - [`render`]: Declaration reconstruction
//! - [`dump`]: One artifact per module, optionally in parallel
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use ildump_core::{DumpConfig, Dumper, Metadata};
//! use std::fs;
//!
//! let data = fs::read("./metadata.pb")?;
//! let metadata = Metadata::from_bytes(&data)?;
//!
//! let config = DumpConfig::new("./dump").filter(Some("UnityEngine".to_string()));
//! let report = Dumper::new(config).dump(&metadata)?;
//! assert!(report.is_complete());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! [`DeclarationVisitor`] walks the same categorized view the renderer
//! prints, for callers that want something other than text.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod dump;
pub mod error;
pub mod model;
pub mod render;

pub use dump::{DumpConfig, DumpReport, Dumper, ModuleOutcome, ModuleStatus};
pub use error::{Error, Result};
pub use model::{Metadata, Module, TypeDefinition};
pub use render::{
    DeclarationVisitor, ModuleRenderer, NullVisitor, ReconstructorConfig, RenderStats,
    StatsVisitor,
};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
