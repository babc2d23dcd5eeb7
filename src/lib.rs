//! govchain - A proof-of-work ledger with community governance
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, chain validation, snapshots
//! - [`transaction`] - Transaction types and signing
//! - [`mempool`] - Pending transaction pool
//!
//! ## Consensus
//! - [`miner`] - Proof-of-work nonce search
//!
//! ## Governance
//! - [`governance`] - Reversal, voting and report systems
//!
//! ## Cryptography
//! - [`crypto`] - Digests and secp256k1 signatures
//!
//! ## State Management
//! - [`persistence`] - Database layer (SQLite) and in-memory store
//! - [`clock`] - Injectable time source
//!
//! ## Node & Integration
//! - [`node`] - Long-running node with background loops
//! - `rpc` - JSON-RPC 2.0 endpoint (feature `api`)
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod miner;

// ============================================================================
// Governance
// ============================================================================
pub mod governance;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// State Management
// ============================================================================
pub mod clock;
pub mod persistence;

// ============================================================================
// Node & Integration
// ============================================================================
pub mod node;
#[cfg(feature = "api")]
pub mod rpc;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

pub use blockchain::{Block, BlockRef, Blockchain, ChainSnapshot};
pub use error::{ChainError, Result};
pub use governance::{GovernanceSnapshot, GovernanceSystems};
pub use transaction::{Transaction, TxPayload};
