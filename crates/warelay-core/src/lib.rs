//! # warelay-core
//!
//! Core types, traits, configuration, and error handling for the relay.

pub mod config;
pub mod error;
pub mod message;
pub mod session;
pub mod traits;
