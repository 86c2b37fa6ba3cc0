//! Vesta Client - HTTP clients for external APIs
//!
//! This crate provides HTTP clients for interacting with:
//!
//! - [`ckan`] - CKAN open data portals (catalog and datastore)
//! - [`openai`] - OpenAI embeddings and chat-completions APIs
//!
//! # Overview
//!
//! The clients handle authentication, request building, response parsing,
//! retries and error classification, and implement the `vesta-core` traits
//! (`PortalClient`, `EmbeddingProvider`, `ChatProvider`).

pub mod ckan;
pub mod openai;

// Re-export main client types
pub use ckan::{CkanClient, CkanConfig};
pub use openai::OpenAIClient;
