//! ragline - multi-tenant retrieval-augmented generation
//!
//! Ingestion: document → chunks → embeddings → vector store.
//! Query: question → embedding → tenant-scoped retrieval → synthesized answer.
//!
//! Embedding, vector store and language model backends are closed enums
//! picked once from [`config::Config`]; [`service::RagService`] wires them
//! into the indexing and query pipelines.

pub mod errors;

pub mod chunking;
pub mod config;
pub mod embedding;
pub mod llm;
pub mod vector_store;

pub mod indexing;
pub mod query;
pub mod service;

pub mod cli;
pub mod doctor;
pub mod logging;
pub mod telemetry;

pub use errors::{RagError, Result};
pub use service::RagService;
