//! Persistent memory for AI agents — durable text memories with hybrid
//! retrieval, forgetting-curve decay, and contradiction detection.
//!
//! Engram stores short text memories per project scope and retrieves them by
//! combined lexical and semantic relevance. Every record ages along an
//! Ebbinghaus-style forgetting curve and carries an effective confidence
//! derived from confirmations, contradictions, and idle time. New content is
//! scanned against the existing corpus through a layered contradiction
//! pipeline (pattern rules → similarity → NLI).
//!
//! # Architecture
//!
//! - **Storage**: SQLite with FTS5 for keyword search; vectors either
//!   co-located via [sqlite-vec](https://github.com/asg017/sqlite-vec)
//!   (embedded backend) or in a managed Qdrant-style child process
//!   (sidecar backend)
//! - **Embeddings**: Local ONNX Runtime with all-MiniLM-L6-v2 (384 dimensions)
//! - **Search**: Hybrid vector + BM25 keyword search merged via weighted
//!   Reciprocal Rank Fusion
//! - **Consistency**: layered contradiction detector writing bitemporal
//!   edges between conflicting memories
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`db`] — SQLite database initialization, schema, and migrations
//! - [`error`] — Error taxonomy separating transient, advisory, and fatal failures
//! - [`embedding`] — Text-to-vector embedding pipeline via ONNX Runtime
//! - [`nli`] — Natural-language-inference provider for the detector's last tier
//! - [`vector`] — Vector-store abstraction with embedded and sidecar backends
//! - [`memory`] — Core engine: store, search, retention, confidence,
//!   contradiction, edges, and maintenance

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod nli;
pub mod vector;
