//! Declarative network configuration compiler.
//!
//! Reads a hierarchy of YAML documents describing network devices, merges
//! them into one model, checks it, and renders configuration for two
//! backends: systemd-networkd units and NetworkManager keyfile profiles.
//! The reverse direction turns an existing NetworkManager profile back into
//! a declarative document.
//!
//! # Architecture
//!
//! ## Loading
//!
//! - [`context`] — Engine defaults threaded through every stage
//! - [`loader`] — Discover documents under `lib/`, `etc/` and `run/`
//! - [`parse`] — Accumulating parser that merges documents by device ID
//! - [`patch`] — Dotted-path patches and write-back into the hierarchy
//!
//! ## Model
//!
//! - [`model`] — Device definitions, per-kind payloads, addressing
//! - [`resolve`] — Reference resolution, backend selection, freeze order
//! - [`state`] — The frozen, immutable model
//!
//! ## Checking
//!
//! - [`validate`] — Structural, range and backend-capability checks
//! - [`error`] — Diagnostics with document positions
//!
//! ## Output
//!
//! - [`render`] — networkd, NetworkManager and udev output trees
//! - [`serialize`] — Canonical YAML for a model
//! - [`import`] — NetworkManager keyfile to device definition
//!
//! # Example
//!
//! ```no_run
//! use netdecl::context::EngineContext;
//! use netdecl::parse::Parser;
//!
//! let ctx = EngineContext::new("/");
//! let mut parser = Parser::new();
//! parser.load_hierarchy(&ctx)?;
//! let state = parser.freeze(&ctx)?;
//! netdecl::validate::validate(&state, &ctx)?;
//! let tree = netdecl::render::render(&state, &ctx)?;
//! println!("{} files", tree.len());
//! # Ok::<(), netdecl::Error>(())
//! ```

pub mod context;
pub mod error;
pub mod import;
pub mod loader;
pub mod model;
pub mod parse;
pub mod patch;
pub mod render;
pub mod resolve;
pub mod serialize;
pub mod state;
pub mod validate;

pub use error::{Error, Result};
