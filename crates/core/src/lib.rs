//! # sessionloom core
//!
//! Domain types, traits, and error definitions for the sessionloom
//! session-state pipeline. This crate has **no I/O**: it defines the domain
//! model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator the pipeline talks to is a trait here:
//! - `Provider`: the opaque model capability (prompt + schema in, structured result out)
//! - `StateStore`: durable load/save of `PersistedState`
//!
//! Implementations live in their respective crates, so the pipeline can be
//! driven with in-memory fakes in tests.

pub mod error;
pub mod message;
pub mod provider;
pub mod memory;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{CapabilityError, Error, Result, SchemaValidationError, StorageError};
pub use message::{Message, Role, SessionId, Turn};
pub use provider::{OutputSchema, Provider, ProviderRequest, ProviderResponse, Usage};
pub use memory::{
    FactProvenance, FactUpdate, MergeReport, PersistedState, ProfileFact, StateStore, StateUpdate,
    SummaryHighlights, TurnRange, UserProfile, SCHEMA_VERSION,
};
pub use event::{DomainEvent, EventBus};
