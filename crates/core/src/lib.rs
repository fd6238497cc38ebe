//! Core types and shared functionality for feedwatch.
//!
//! This crate provides:
//! - Fingerprint ledger model and content fingerprinting
//! - Ledger and change-batch storage with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod error;
pub mod ledger;
pub mod store;

pub use config::{AppConfig, ConfigError, ExtractRule};
pub use error::Error;
pub use ledger::{ArticleRecord, ChangedArticle, EvictionOutcome, FingerprintLedger, fingerprint};
pub use store::LedgerDb;
