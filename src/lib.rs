//! Agent Relay — routes chat messages on a shared topic to an LLM and back.

pub mod channels;
pub mod config;
pub mod envelope;
pub mod error;
pub mod llm;
pub mod moderation;
pub mod pipeline;
