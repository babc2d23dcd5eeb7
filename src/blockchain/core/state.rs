use crate::crypto::Address;
use crate::error::ChainError;
use crate::transaction::{Transaction, TxPayload};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::chain::Block;

/// A token registered on chain. The native token is created in genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub symbol: String,
    pub name: String,
    pub total_supply: u64,
    pub owner: Address,
    pub created_at_block: u64,
}

/// Derived index over committed blocks: balances, known addresses, the
/// block each transaction landed in, and the token registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerState {
    pub balances: HashMap<Address, u64>,
    pub known_addresses: HashSet<Address>,
    pub transaction_index: HashMap<String, u64>,
    pub tokens: BTreeMap<String, TokenInfo>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replays every block from genesis.
    pub fn rebuild(blocks: &[Block]) -> Result<Self, ChainError> {
        let mut state = Self::new();
        for block in blocks {
            state.apply_block(block)?;
        }
        Ok(state)
    }

    pub fn get_balance(&self, address: &str) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    pub fn contains_transaction(&self, hash: &str) -> bool {
        self.transaction_index.contains_key(hash)
    }

    pub fn apply_block(&mut self, block: &Block) -> Result<(), ChainError> {
        for tx in &block.transactions {
            self.apply_transaction(tx, block.index)?;
        }
        Ok(())
    }

    pub fn apply_transaction(&mut self, tx: &Transaction, block_index: u64) -> Result<(), ChainError> {
        if self.transaction_index.contains_key(&tx.hash) {
            return Err(ChainError::IntegrityError(format!(
                "Transaction {} appears twice in the chain",
                tx.hash
            )));
        }

        // Nothing is written until both legs check out.
        let mut debit = None;
        if let Some(from) = &tx.from {
            if tx.amount > 0 {
                let available = self.get_balance(from);
                let remaining = available.checked_sub(tx.amount).ok_or_else(|| {
                    ChainError::IntegrityError(format!(
                        "Transaction {} overdraws {}: balance {}, amount {}",
                        tx.hash, from, available, tx.amount
                    ))
                })?;
                debit = Some((from.clone(), remaining));
            }
        }

        let mut credit = None;
        if tx.amount > 0 {
            let base = match &debit {
                Some((from, remaining)) if *from == tx.to => *remaining,
                _ => self.get_balance(&tx.to),
            };
            let balance = base.checked_add(tx.amount).ok_or_else(|| {
                ChainError::IntegrityError(format!("Balance overflow for {}", tx.to))
            })?;
            credit = Some(balance);
        }

        if let Some((from, remaining)) = debit {
            self.balances.insert(from, remaining);
        }
        if let Some(balance) = credit {
            self.balances.insert(tx.to.clone(), balance);
        }
        if let Some(from) = &tx.from {
            self.known_addresses.insert(from.clone());
        }
        self.known_addresses.insert(tx.to.clone());

        if let Some(TxPayload::TokenCreation {
            symbol,
            name,
            supply,
        }) = &tx.data
        {
            self.tokens.insert(
                symbol.clone(),
                TokenInfo {
                    symbol: symbol.clone(),
                    name: name.clone(),
                    total_supply: *supply,
                    owner: tx.to.clone(),
                    created_at_block: block_index,
                },
            );
        }

        self.transaction_index.insert(tx.hash.clone(), block_index);
        Ok(())
    }
}
