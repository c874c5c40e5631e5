//! Document parser for tome.
//!
//! Turns raw document bytes into ordered text [`Fragment`]s with positional
//! metadata. Chunking happens on paragraph boundaries so each fragment stays
//! semantically coherent; oversized paragraphs are split on sentence
//! boundaries. Parsing is synchronous and total over supported input: it
//! never panics, and empty input yields an empty fragment list.

pub mod error;
pub mod parser;

pub use error::ParseError;
pub use parser::{DocParser, MAX_CHUNK_CHARS, MIN_CHUNK_CHARS};
