//! ID token authentication.
//!
//! - `jwt` - compact-serialization parsing
//! - `keys` - cached issuer signing keys
//! - `claims` - verified token record and claims validation
//! - `verifier` - the verification pipeline tying them together

pub mod claims;
pub mod jwt;
pub mod keys;
pub mod verifier;
