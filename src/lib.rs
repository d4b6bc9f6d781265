#![deny(missing_docs)]

//! Core library for the cortex-rag document question answering service.

/// HTTP routing and REST handlers.
pub mod api;
/// Blob storage abstraction for raw uploaded files.
pub mod blob;
/// Sentence-respecting text chunking.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text extraction from uploaded document bytes.
pub mod extract;
/// Answer generation client and prompt assembly.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and query counters.
pub mod metrics;
/// Workflow functions for document ingestion and question answering.
pub mod pipelines;
/// Service facade wiring components and deletion flows.
pub mod service;
/// Conversation, message, and document metadata storage.
pub mod store;
/// Vector index abstraction and Qdrant integration.
pub mod vector;
/// Event-driven step engine with memoization and retry.
pub mod workflow;
