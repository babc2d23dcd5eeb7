//! Pending transaction pool.
//!
//! Insertion order is preserved so that a block replays transactions in the
//! order they were accepted; a later transfer may depend on an earlier credit.

use crate::error::ChainError;
use crate::transaction::Transaction;
use std::collections::HashSet;

pub const DEFAULT_MAX_MEMPOOL_SIZE: usize = 10_000;

#[derive(Debug, Clone)]
pub struct Mempool {
    transactions: Vec<Transaction>,
    hashes: HashSet<String>,
    max_size: usize,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

impl Mempool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_MEMPOOL_SIZE)
    }

    pub fn with_capacity(max_size: usize) -> Self {
        Mempool {
            transactions: Vec::new(),
            hashes: HashSet::new(),
            max_size,
        }
    }

    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        if self.hashes.contains(&tx.hash) {
            return Err(ChainError::StateError(format!(
                "Transaction {} is already pending",
                tx.hash
            )));
        }
        if self.transactions.len() >= self.max_size {
            return Err(ChainError::MempoolFull);
        }
        self.hashes.insert(tx.hash.clone());
        self.transactions.push(tx);
        Ok(())
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    pub fn get_transaction(&self, hash: &str) -> Option<&Transaction> {
        if !self.hashes.contains(hash) {
            return None;
        }
        self.transactions.iter().find(|tx| tx.hash == hash)
    }

    pub fn get_all_transactions(&self) -> Vec<Transaction> {
        self.transactions.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter()
    }

    /// Drops every transaction whose hash is in `included`, keeping the rest in order.
    pub fn remove_included<'a>(&mut self, included: impl IntoIterator<Item = &'a str>) {
        let included: HashSet<&str> = included.into_iter().collect();
        self.transactions
            .retain(|tx| !included.contains(tx.hash.as_str()));
        self.hashes.retain(|h| !included.contains(h.as_str()));
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
