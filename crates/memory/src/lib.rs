//! Long-term memory store implementations for Mnemos.
//!
//! - [`SubstringStore`]: case-insensitive substring search, always available
//! - [`VectorStore`]: cosine similarity over embeddings
//! - [`open_store`]: picks the vector store when the embedder answers a probe
//! - [`AutoSaver`]: condenses finished turns into `type=turn` records

pub mod autosave;
pub mod document;
pub mod factory;
pub mod substring;
pub mod vector;

pub use autosave::{AutoSavePolicy, AutoSaver, contains_sensitive};
pub use document::StoreDocument;
pub use factory::{open_offline, open_store};
pub use substring::SubstringStore;
pub use vector::{VectorStore, cosine_similarity};
