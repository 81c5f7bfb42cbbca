//! gembed sql: SQL embedding functions for SQLite.
//!
//! `embed_text` returns one packed little-endian vector, `embed_texts` a JSON
//! array of vectors for a JSON-like array of input texts.

pub mod array;
pub mod context;
pub mod encode;
pub mod functions;

pub use array::{decode, decode_with_capacity, DecodeError, StringArray};
pub use context::CallContext;
pub use encode::{encode_batch_json, encode_vector};
pub use functions::{
    register_functions, unregister_functions, EmbedText, EmbedTexts, EMBED_TEXT, EMBED_TEXTS,
};
