//! Cadex Core — shared domain abstractions.
//!
//! This crate defines the fundamental traits and types that the story
//! context and the store implementations depend on. It contains no
//! infrastructure code.

pub mod command;
pub mod error;
pub mod rng;
pub mod store;
