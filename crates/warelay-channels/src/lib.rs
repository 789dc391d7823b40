//! # warelay-channels
//!
//! Messaging platform integrations for the relay.

pub mod whatsapp;
