//! Stateless authentication and role-based authorization
//!
//! Tokens are self-contained: nothing about a session is kept server-side,
//! and there is no revocation list. A token stays valid until it expires.

pub mod credentials;
pub mod gate;
pub mod policy;
pub mod token;

pub use credentials::CredentialVerifier;
pub use gate::AuthenticationGate;
pub use policy::{authorize, require, Decision};
pub use token::{DecodedToken, TokenCodec};
