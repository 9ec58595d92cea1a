//! # Synthesis RAG
//!
//! A hybrid lexical + semantic retrieval store with two physically
//! isolated collections: public (shareable) and private (confidential).
//!
//! The engine combines BM25 keyword scoring with dense embedding
//! similarity, fused by reciprocal rank, and enforces a safe-default
//! visibility policy: everything is private unless a caller explicitly
//! publishes it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────────────┐
//! │  Caller   │──▶│  RagEngine     │──▶│  FragmentStore    │
//! │ (bridge,  │   │  add / search │   │  public.db        │
//! │  CLI, …)  │   │  audit        │   │  private.db       │
//! └──────────┘   └──────┬────────┘   └──────────────────┘
//!                       │
//!              ┌────────┴─────────┐
//!              ▼                  ▼
//!        ┌──────────┐      ┌────────────┐
//!        │  Ranker   │      │ Embedding   │
//!        │ BM25+RRF │      │  Provider   │
//!        └──────────┘      └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use synthesis_rag::config::Config;
//! use synthesis_rag::embedding::create_provider;
//! use synthesis_rag::engine::RagEngine;
//! use synthesis_rag::models::{FragmentMetadata, Scope};
//!
//! # async fn run() -> synthesis_rag::error::Result<()> {
//! let config = Config::default();
//! let provider = create_provider(&config.embedding)?;
//! let engine = RagEngine::open(&config, provider).await?;
//!
//! // Private by default; publishing requires the distinct method.
//! engine.add("PlayerController handles input", FragmentMetadata::default(), None).await?;
//! engine.add_public("Unity uses C# for scripting", FragmentMetadata::default(), None).await?;
//!
//! let results = engine.search("unity scripting", Scope::Both, Some(5), None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Structured error taxonomy |
//! | [`models`] | Fragments, metadata, scopes, and results |
//! | [`db`] | SQLite connection and schema |
//! | [`store`] | Deduplicated per-collection persistence |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`ranker`] | BM25, cosine ranking, reciprocal rank fusion |
//! | [`audit`] | Advisory leak scanning for public content |
//! | [`engine`] | The retrieval facade |

pub mod audit;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod models;
pub mod ranker;
pub mod store;
