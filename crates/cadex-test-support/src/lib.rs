//! Shared test doubles for the Cadex story engine.

mod rng;
mod store;

pub use rng::{MockRng, SequenceRng};
pub use store::{ContendedDocumentStore, FailingDocumentStore, PathFailingDocumentStore};
