//! Model capability implementations for sessionloom.
//!
//! All providers implement the `sessionloom_core::Provider` trait.
//! `build_from_config` selects the backend from configuration.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::build_from_config;
