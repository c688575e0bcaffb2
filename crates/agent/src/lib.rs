//! Chat pipeline - LLM-driven SQL analytics over the CRM database
//!
//! This crate is the request pipeline behind the chat endpoint:
//!
//! 1. **Thread state** (`thread`) - per-conversation append-only message log
//! 2. **SQL generation** (`pipeline` + `prompts`) - non-streaming LLM pass
//!    that turns a question plus recent context into candidate SQL
//! 3. **Recovery** (`extract`) - pull one SQL statement out of free-form
//!    model text and repair escaping artifacts
//! 4. **Validation** (`validate`) - classify the statement as read-only-safe
//!    or rejected before it can touch the database
//! 5. **Composition** (`pipeline`) - second, streaming LLM pass that narrates
//!    query results (or a failure context) back to the user
//!
//! # Safety principle
//!
//! The SQL text originates from an untrusted generative model. Validation is
//! a leading-keyword whitelist plus body blacklist, not a parser; the
//! database role the pool connects as should be read-only as a second layer.
//! Validation and execution failures are never surfaced to the caller as
//! errors - they flow forward into the composition pass as failure context
//! and come back as a conversational answer.

pub mod extract;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod thread;
pub mod validate;

pub use llm::{ChatClient, ChatMessage, ChatOptions, LlmError, OpenAiClient};
pub use pipeline::{ChatPipeline, ChatRequest, ExecuteError, PipelineModels, QueryExecutor};
pub use thread::{ThreadStore, ThreadStoreConfig};
