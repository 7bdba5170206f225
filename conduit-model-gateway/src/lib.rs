#![deny(missing_docs)]
//! Model Gateway: a single `send()` operation across registered LLM providers.
//!
//! This crate defines the provider boundary ([`provider::Provider`], generic
//! and RPITIT-based for zero-overhead calls from a concrete agent runtime),
//! the internal message/response types every provider converts to and from,
//! context compaction strategies, and [`router::ModelGateway`] — the router
//! the rest of the workspace actually calls.

pub mod config;
pub mod context;
pub mod convert;
pub mod provider;
pub mod router;
pub mod types;

// Re-exports
pub use config::ModelGatewayConfig;
pub use context::{ContextStrategy, NoCompaction, SlidingWindow};
pub use convert::{
    content_block_to_part, content_part_to_block, content_to_parts, content_to_user_message,
    parts_to_content,
};
pub use provider::{Provider, ProviderDyn, ProviderError};
pub use router::{GatewayError, ModelBinding, ModelGateway};
pub use types::*;
