//! # Verifier Test Utilities
//!
//! Shared test utilities for the token verifier.
//!
//! This crate provides:
//! - Fixed RSA keys and certificates (reproducible signatures)
//! - A signed test token builder (TestTokenBuilder)
//! - A mock key distribution endpoint (MockKeyServer)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use verifier_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let keys = MockKeyServer::start().await;
//!     keys.serve_keys(&[&TEST_KEY_1], 3600).await;
//!
//!     let token = TestTokenBuilder::new(TEST_PROJECT_ID)
//!         .for_subject("alice")
//!         .sign(&TEST_KEY_1);
//! }
//! ```

pub mod crypto_fixtures;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use server_harness::*;
pub use token_builders::*;
