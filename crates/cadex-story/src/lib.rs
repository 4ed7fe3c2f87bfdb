//! Cadex — the story bounded context.
//!
//! Responsible for story lifecycle, turn progression, hand-off privacy
//! and the fan-out of hand-off text into players' private records.

pub mod application;
pub mod domain;
