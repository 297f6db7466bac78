//! LLM-backed text tasks for the lead pipeline.
//!
//! Everything here treats the model strictly as a text transformer:
//! - `extraction` turns raw user inputs into a structured field snapshot
//! - `conversation` renders a transcript and asks for a summary
//! - `suggestions` generates pretype prompts for the chat widget
//!
//! The model never decides whether a lead qualifies or which CRM fields
//! change; those are deterministic decisions made downstream.

pub mod conversation;
pub mod extraction;
pub mod llm;
pub mod prompts;
pub mod suggestions;

pub use llm::LlmClient;
