//! Domain model for the story context.

pub mod codec;
pub mod commands;
pub mod engine;
pub mod story;
