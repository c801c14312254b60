//! Request authentication

pub mod middleware;
pub mod signature;

pub use middleware::{require_signature, AuthGate};
