//! These models represent the output of a render as it flows through the binding
//!
//! The renderer hands back a JSON intermediate representation; we decode it once,
//! at this boundary, into closed types and validate where tool parts may appear.
//! Every output format is then a read-only projection of a [`message::Frame`]:
//! - the renderer's own wire shape (message list and full dict)
//! - openai chat completion parameters
//! - langchain message history
pub mod content;
pub mod message;
pub mod tool;
