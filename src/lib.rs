//! AuditLedger - a private, permissioned, hash-chained ledger for accounting actions
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, genesis, the ledger itself and validation
//! - [`transaction`] - Transaction records, approvals and the builder
//!
//! ## Hashing
//! - [`hash`] - SHA-256 and canonical JSON hashing
//! - [`merkle`] - Merkle trees and inclusion proofs
//!
//! ## Collaborators
//! - [`policy`] - Contract policies and approval requirements
//! - [`rbac`] - Roles, permissions and approval eligibility
//! - [`nonce`] - Single-use login challenges
//! - [`security`] - Format checks for wallets, signatures and timestamps
//!
//! ## State Management
//! - [`persistence`] - Block stores (SQLite, in-memory)
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`cli`] - CLI utilities

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod transaction;

// ============================================================================
// Hashing
// ============================================================================
pub mod hash;
pub mod merkle;

// ============================================================================
// Collaborators
// ============================================================================
pub mod nonce;
pub mod policy;
pub mod rbac;
pub mod security;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod cli;
pub mod config;
pub mod error;

pub use blockchain::{Block, BlockBuilder, Ledger, SharedLedger, Validator};
pub use error::{ChainError, Result};
pub use transaction::{Transaction, TransactionBuilder, TransactionStatus};

/// Current wall-clock time in unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
