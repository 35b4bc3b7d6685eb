//! # reftree-core
//!
//! A Rust library for loading, displaying and editing nested reference trees of a headless CMS.
//!
//! ## Overview
//!
//! Content in the CMS is a graph of entries linking to one another through reference fields: a
//! place lists the places and points of interest it contains, a point of interest lists its
//! channel-specific variants, a taxonomy tag lists its sub-tags. reftree-core walks that graph from
//! a root entry into an in-memory tree, fetching linked entries in rate-limited batches, and offers
//! the read-modify-write operations an editor needs to change references safely.
//!
//! ### Key Features
//!
//! - **Batched fetching**: fixed-size concurrent groups with a pluggable throttle between them
//! - **Fault-tolerant materialization**: missing or unreachable entries are dropped, unknown
//!   content types become placeholders, references back to an ancestor are cut
//! - **Stable ordering**: low-priority content types sink behind their siblings, nothing else moves
//! - **Single active variant**: selecting a variant for a place deselects the place's other variants
//! - **Versioned writes**: every edit sends back the version it read; concurrent edits surface as
//!   conflicts instead of silently winning
//! - **Generation-guarded sessions**: a refresh that finishes after a newer one started is dropped
//!
//! ## Architecture
//!
//! - **[`source`]**: the `ContentSource` seam (`MemorySource`, and `http::CmaClient` with the
//!   `http` feature)
//! - **[`batch`]** and **[`resolver`]**: turning link descriptors into entries
//! - **[`tree`]**: the `Materializer` and `TreeNode`
//! - **[`variant`]** and **[`gateway`]**: selection logic and the write path
//! - **[`session`]**: ties the above together for one root entry
//! - **[`schema`]** and **[`config`]**: which content types play which role
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reftree_core::{config::ReftreeConfig, source::MemorySource, session::TreeSession};
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = Arc::new(MemorySource::new("en-US"));
//!     let session = TreeSession::new(source, ReftreeConfig::default());
//!     session.set_root("root-place");
//!
//!     if let Some(tree) = session.refresh().await? {
//!         tree.root.walk(&mut |node, depth| {
//!             println!("{}{}", "  ".repeat(depth), node.label);
//!         });
//!         for dropped in &tree.dropped {
//!             println!("dropped {} from {}: {}", dropped.target, dropped.parent_id, dropped.reason);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **default**: library with the in-memory source
//! - **http**: `CmaClient` over the content-management REST API (`reqwest`)
//! - **bin**: the `reftree` CLI

pub mod batch;
pub mod config;
pub mod error;
pub mod event;
pub mod gateway;
#[cfg(feature = "http")]
pub mod http;
pub mod locator;
pub mod paging;
pub mod properties;
pub mod resolver;
pub mod schema;
pub mod session;
pub mod source;
#[cfg(test)]
mod tests;
pub mod tree;
pub mod variant;

pub use error::*;
