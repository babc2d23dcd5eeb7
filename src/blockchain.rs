// Thin re-export module: the chain lives in `blockchain/core.rs`, split into
// block storage, derived ledger state and integrity checks.

pub mod core;
pub use core::*;
