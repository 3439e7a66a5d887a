//! # pairwire-core
//!
//! Domain types, the shared-store contract, and the wire protocol for the
//! pairwire terminal relay broker. This crate has **zero framework
//! dependencies** beyond serde/tokio/async-trait — it defines the domain
//! model that every other crate implements against.
//!
//! ## Design philosophy
//!
//! The shared-store adapter (component C) is defined here as a trait
//! ([`store::Store`]), not an implementation. Implementations live in their
//! own crates (`pairwire-store-memory` today; a networked backend could
//! live alongside it later without touching anything upstream of the
//! trait).

pub mod error;
pub mod event;
pub mod identity;
pub mod protocol;
pub mod store;

pub use error::{Error, PairingError, Result, StoreError};
pub use event::{DomainEvent, EventBus};
pub use identity::{AppIdentity, ClientToken, RunnerCredential, RunnerId};
pub use store::Store;
