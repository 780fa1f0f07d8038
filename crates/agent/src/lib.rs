//! The Mnemos agent: a tool-calling dispatch loop over a hosted model,
//! with long-term memory feeding every call.
//!
//! One user turn flows through these pieces:
//!
//! 1. [`Session`] classifies the input line (exit, slash command or prompt)
//!    and mints the turn's [`RequestId`](mnemos_core::RequestId)
//! 2. [`MemoryAugmentedModel`] prepends recalled memories to each model call
//! 3. [`DispatchLoop`] alternates model calls and tool calls until the model
//!    answers without a directive, or the round limit forces an answer
//! 4. The finished turn is saved to memory in the background on the
//!    [`WorkerPool`]

pub mod augment;
pub mod directive;
pub mod dispatch;
pub mod persona;
pub mod pool;
pub mod prompt;
pub mod session;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use augment::MemoryAugmentedModel;
pub use directive::{DirectiveForm, ToolDirective, parse_directive};
pub use dispatch::DispatchLoop;
pub use persona::{PersonaInjector, SystemPromptHook};
pub use pool::{PoolError, WorkerPool};
pub use prompt::default_system_prompt;
pub use session::{Input, Reply, Session};
