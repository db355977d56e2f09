#![deny(unused)]
//! Core types, traits, and error definitions for the Operative Gate.
//!
//! This crate provides the building blocks shared by the governance
//! components and the gate itself, plus the pure hash-chain and Merkle
//! functions the audit trail is built on.

pub mod canonical;
pub mod config;
pub mod error;
pub mod integrity;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
