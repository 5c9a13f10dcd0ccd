//! Trigram text index and the in-memory classification store.
//!
//! [`TrigramIndex`] wraps an in-RAM Tantivy index with a 3-gram tokenizer
//! over code and names. [`MemoryClassificationStore`] pairs it with ordered
//! row maps and implements `ClassificationStore`, keeping rows and index
//! documents in step.

pub mod memory;
pub mod trigram;

pub use memory::MemoryClassificationStore;
pub use trigram::{IndexError, TrigramIndex};
