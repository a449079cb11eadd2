//! HTTP backend for the asset sync engine.
//!
//! This crate provides a `SyncClient` implementation on top of `reqwest`.
//! Every request carries a bearer token from an [`AuthProvider`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use asset_sync_storage::{ProjectTarget, SaveOrchestrator};
//! use asset_sync_storage_http::{HttpSyncClient, StaticToken};
//!
//! let client = HttpSyncClient::new("https://api.example.com", Arc::new(StaticToken::new(token)))?;
//! let orchestrator = SaveOrchestrator::new(client, registry, document, ProjectTarget::new(id));
//! let report = orchestrator.save(None).await?;
//! ```

mod auth;
mod client;
mod error;

pub use auth::{AuthProvider, StaticToken};
pub use client::HttpSyncClient;
pub use error::HttpError;
