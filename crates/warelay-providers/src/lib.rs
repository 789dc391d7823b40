//! # warelay-providers
//!
//! Reply providers for the relay. The only one today is the HTTP webhook.

pub mod webhook;
