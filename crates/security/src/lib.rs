//! Security primitives for the pairwire broker — credential checks,
//! signed app bearer tokens, and pairing-code generation/validation.

pub mod app_token;
pub mod credential;
pub mod pairing_code;

pub use app_token::{AppTokenError, VerifiedClaims};
pub use credential::CredentialValidator;
