//! # Mnemos Core
//!
//! Domain types, traits, and error definitions for the Mnemos agent.
//! This crate has **no I/O of its own**; it defines the contracts that the
//! memory, tools, provider, and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the dispatch loop is a trait here:
//! - [`ModelCall`]: one prompt in, one completion out
//! - [`Tool`]: one string argument in, one [`ToolOutput`] out
//! - [`MemoryStore`]: append-only record store with search and persistence
//! - [`Embedder`]: optional similarity backend for the memory store
//!
//! The correlation [`RequestId`] is passed explicitly through all of them.

pub mod error;
pub mod memory;
pub mod model;
pub mod request_id;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{MemoryError, ProviderError, ToolError};
pub use memory::{Embedder, MemoryRecord, MemoryStore, Metadata, SearchHit, StoreInfo};
pub use model::ModelCall;
pub use request_id::RequestId;
pub use tool::{Tool, ToolOutput, ToolRegistry};
