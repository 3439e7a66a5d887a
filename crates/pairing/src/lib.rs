//! The pairing engine: components D–G of the broker, all written purely
//! against [`pairwire_core::Store`] so a networked backend can replace
//! `pairwire-store-memory` without touching this crate.

pub mod code_registry;
pub mod history;
pub mod rate_limiter;
pub mod session_registry;

pub use code_registry::CodeRegistry;
pub use history::{HistoryAction, HistoryEntry, PairingHistory};
pub use rate_limiter::RateLimiter;
pub use session_registry::{PairingSession, SessionRegistry};
