//! # ofchannel Testkit
//!
//! Testing utilities for ofchannel.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: known messages with their exact wire frames
//! - **Generators**: proptest strategies for roles, generation ids and messages
//! - **Fixtures**: a scripted controller peer and a session harness
//!
//! ## Golden Vectors
//!
//! ```rust
//! use ofchannel_testkit::vectors::{all_vectors, verify_vector};
//!
//! for vector in all_vectors() {
//!     verify_vector(&vector).unwrap();
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use ofchannel_core::arbitrate;
//! use ofchannel_testkit::generators::{role_request, role_state};
//!
//! proptest! {
//!     #[test]
//!     fn arbitration_is_pure(state in role_state(), request in role_request()) {
//!         prop_assert_eq!(arbitrate(&state, &request), arbitrate(&state, &request));
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ofchannel_session::SessionConfig;
//! use ofchannel_testkit::fixtures::{RecordingRegistry, SessionFixture};
//!
//! async fn example() {
//!     let registry = Arc::new(RecordingRegistry::new());
//!     let mut fx = SessionFixture::spawn(SessionConfig::default(), registry);
//!     fx.controller.handshake(None).await;
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{ControllerPeer, RecordingRegistry, SessionFixture};
pub use vectors::{all_vectors, verify_all_vectors, verify_vector, WireVector};
