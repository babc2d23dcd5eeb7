use crate::clock::{system_clock, SharedClock};
use crate::config::ChainConfig;
use crate::crypto::Address;
use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::miner;
use crate::persistence::{InMemoryPersistence, Persistence};
use crate::transaction::{SystemAuthority, Transaction, TxPayload, SYSTEM_ADDRESS};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::state::{LedgerState, TokenInfo};
use super::validation::{validate_snapshot, verify_chain};

/// Previous-hash sentinel carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";
/// Fixed genesis timestamp (2023-01-01T00:00:00Z) so every node derives the same genesis.
pub const GENESIS_TIMESTAMP: u64 = 1672531200000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    pub fn new(
        index: u64,
        timestamp: u64,
        transactions: Vec<Transaction>,
        previous_hash: impl Into<String>,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp,
            transactions,
            previous_hash: previous_hash.into(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.compute_digest();
        block
    }

    /// Hex SHA-256 over `{index, timestamp, transactions, previous_hash, nonce}`.
    pub fn compute_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.index.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        // Serializing plain derived structs cannot fail.
        hasher.update(serde_json::to_vec(&self.transactions).unwrap_or_default());
        hasher.update((self.previous_hash.len() as u64).to_le_bytes());
        hasher.update(self.previous_hash.as_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hex::encode(hasher.finalize())
    }

    /// Searches for a nonce whose digest has `difficulty` leading hex zeros.
    pub fn mine(&mut self, difficulty: u32) -> Result<(), ChainError> {
        miner::search_nonce(self, difficulty, miner::DEFAULT_MAX_ATTEMPTS).map(|_| ())
    }

    /// Stored hash matches a fresh digest.
    pub fn is_valid(&self) -> bool {
        self.hash == self.compute_digest()
    }

    pub fn contains_transaction(&self, hash: &str) -> bool {
        self.transactions.iter().any(|tx| tx.hash == hash)
    }
}

/// How a caller addresses a block: by index, by hash or the chain tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockRef {
    Index(u64),
    Latest,
    Hash(String),
}

impl FromStr for BlockRef {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(BlockRef::Latest);
        }
        if let Ok(index) = s.parse::<u64>() {
            return Ok(BlockRef::Index(index));
        }
        if !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(BlockRef::Hash(s.to_ascii_lowercase()));
        }
        Err(ChainError::ValidationError(format!(
            "Block reference must be an index, a hash or 'latest', got '{}'",
            s
        )))
    }
}

/// Serialized chain layout: `{chain, difficulty, miningReward, tokens}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSnapshot {
    pub chain: Vec<Block>,
    pub difficulty: u32,
    pub mining_reward: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<TokenInfo>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub height: u64,
    pub latest_index: u64,
    pub latest_hash: String,
    pub difficulty: u32,
    pub mining_reward: u64,
    pub mempool_size: usize,
    pub tokens: Vec<TokenInfo>,
    pub is_valid: bool,
}

/// Where a transaction was found.
#[derive(Debug, Clone, Copy)]
pub enum TransactionLocation<'a> {
    Committed {
        transaction: &'a Transaction,
        block: &'a Block,
    },
    Pending(&'a Transaction),
}

impl<'a> TransactionLocation<'a> {
    pub fn transaction(&self) -> &'a Transaction {
        match self {
            TransactionLocation::Committed { transaction, .. } => transaction,
            TransactionLocation::Pending(transaction) => transaction,
        }
    }
}

#[derive(Clone)]
pub struct Blockchain {
    pub blocks: Vec<Block>,
    pub difficulty: u32,
    pub mining_reward: u64,
    pub mempool: Mempool,
    pub state: LedgerState,
    pub enforce_balance: bool,
    clock: SharedClock,
    persistence: Arc<dyn Persistence>,
}

impl Blockchain {
    /// Create a new `Blockchain` using an in-memory persistence backend and the system clock.
    pub fn new(genesis_address: impl Into<Address>, initial_difficulty: u32) -> Result<Self, ChainError> {
        let config = ChainConfig {
            genesis_address: genesis_address.into(),
            difficulty: initial_difficulty,
            ..ChainConfig::default()
        };
        Self::with_config(&config, system_clock(), Arc::new(InMemoryPersistence::new()))
    }

    /// Create a genesis-only chain from configuration.
    pub fn with_config(
        config: &ChainConfig,
        clock: SharedClock,
        persistence: Arc<dyn Persistence>,
    ) -> Result<Self, ChainError> {
        miner::validate_difficulty(config.difficulty)?;
        if config.genesis_address.is_empty() {
            return Err(ChainError::ConfigError(
                "Genesis address cannot be empty".to_string(),
            ));
        }

        let genesis = Self::create_genesis_block(config);
        let state = LedgerState::rebuild(std::slice::from_ref(&genesis))?;

        Ok(Blockchain {
            blocks: vec![genesis],
            difficulty: config.difficulty,
            mining_reward: config.mining_reward,
            mempool: Mempool::with_capacity(config.max_mempool_size),
            state,
            enforce_balance: config.enforce_balance,
            clock,
            persistence,
        })
    }

    /// Builds the chain from the last persisted snapshot, falling back to
    /// genesis when nothing usable is stored.
    pub fn load_or_genesis(
        config: &ChainConfig,
        clock: SharedClock,
        persistence: Arc<dyn Persistence>,
    ) -> Result<Self, ChainError> {
        let mut chain = Self::with_config(config, clock, persistence.clone())?;
        match persistence.load_chain() {
            Ok(Some(snapshot)) => {
                if let Err(e) = chain.import_snapshot(snapshot) {
                    warn!("Stored chain snapshot rejected: {}. Starting from genesis.", e);
                }
            }
            Ok(None) => info!("No stored chain snapshot; starting from genesis"),
            Err(e) => warn!("Failed to load chain snapshot: {}. Starting from genesis.", e),
        }
        match persistence.load_pending() {
            Ok(pending) => chain.restore_pending(pending),
            Err(e) => warn!("Failed to load pending transactions: {}", e),
        }
        Ok(chain)
    }

    /// Genesis registers the genesis wallet and mints the native token supply to it.
    fn create_genesis_block(config: &ChainConfig) -> Block {
        let registration = SystemAuthority.issue(
            Some(SYSTEM_ADDRESS.to_string()),
            config.genesis_address.clone(),
            0,
            TxPayload::WalletRegistration {
                address: config.genesis_address.clone(),
            },
            GENESIS_TIMESTAMP,
        );
        let supply = SystemAuthority.issue(
            None,
            config.genesis_address.clone(),
            config.genesis_supply,
            TxPayload::TokenCreation {
                symbol: config.token_symbol.clone(),
                name: config.token_name.clone(),
                supply: config.genesis_supply,
            },
            GENESIS_TIMESTAMP,
        );

        Block::new(
            0,
            GENESIS_TIMESTAMP,
            vec![registration, supply],
            GENESIS_PREVIOUS_HASH,
        )
    }

    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    pub fn height(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn latest_block(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn set_difficulty(&mut self, difficulty: u32) -> Result<(), ChainError> {
        miner::validate_difficulty(difficulty)?;
        info!(old = self.difficulty, new = difficulty, "difficulty changed");
        self.difficulty = difficulty;
        Ok(())
    }

    pub fn set_mining_reward(&mut self, reward: u64) {
        info!(old = self.mining_reward, new = reward, "mining reward changed");
        self.mining_reward = reward;
    }

    /// Validates and queues a transaction. Returns its hash.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<String, ChainError> {
        tx.validate()?;
        tx.validate_size()?;

        if self.state.contains_transaction(&tx.hash) {
            return Err(ChainError::StateError(format!(
                "Transaction {} is already committed",
                tx.hash
            )));
        }

        if self.enforce_balance && tx.amount > 0 {
            if let Some(from) = &tx.from {
                let available = self.get_balance(from);
                if available < tx.amount {
                    return Err(ChainError::InsufficientBalance {
                        address: from.clone(),
                        required: tx.amount,
                        available,
                    });
                }
            }
        }

        let hash = tx.hash.clone();
        let kind = tx.data.as_ref().map_or("TRANSFER", TxPayload::type_name);
        self.mempool.add_transaction(tx)?;
        debug!(tx = %hash, kind, pending = self.mempool.len(), "transaction accepted");
        Ok(hash)
    }

    /// Builds an unmined candidate from the miner's reward plus every pending
    /// transaction that still applies on top of the committed ledger.
    pub fn prepare_block(&self, miner_address: &str) -> Result<Block, ChainError> {
        if self.mempool.is_empty() {
            return Err(ChainError::MiningError(
                "No pending transactions to mine".to_string(),
            ));
        }
        if miner_address.is_empty() {
            return Err(ChainError::ValidationError(
                "Miner address cannot be empty".to_string(),
            ));
        }
        let last_block = self.latest_block().ok_or_else(|| {
            ChainError::MiningError("Cannot mine on an empty chain".to_string())
        })?;

        let index = last_block.index + 1;
        let timestamp = self.now_millis().max(last_block.timestamp);
        let reward = SystemAuthority.issue(
            None,
            miner_address,
            self.mining_reward,
            TxPayload::MiningReward { block_index: index },
            timestamp,
        );

        let mut scratch = self.state.clone();
        scratch
            .apply_transaction(&reward, index)
            .map_err(|e| ChainError::MiningError(e.to_string()))?;

        let mut transactions = Vec::with_capacity(self.mempool.len() + 1);
        transactions.push(reward);
        for tx in self.mempool.iter() {
            match scratch.apply_transaction(tx, index) {
                Ok(()) => transactions.push(tx.clone()),
                Err(e) => debug!(tx = %tx.hash, "left out of candidate: {}", e),
            }
        }
        if transactions.len() == 1 {
            return Err(ChainError::MiningError(
                "No pending transaction applies to the current ledger".to_string(),
            ));
        }

        Ok(Block::new(index, timestamp, transactions, last_block.hash.clone()))
    }

    /// Evicts pending transactions that no longer apply on top of the
    /// committed ledger. Returns the evicted hashes.
    pub fn prune_mempool(&mut self) -> Vec<String> {
        let index = self.height();
        let mut scratch = self.state.clone();
        let mut evicted = Vec::new();
        for tx in self.mempool.iter() {
            if let Err(e) = scratch.apply_transaction(tx, index) {
                warn!(tx = %tx.hash, "evicting pending transaction: {}", e);
                evicted.push(tx.hash.clone());
            }
        }
        if !evicted.is_empty() {
            self.mempool
                .remove_included(evicted.iter().map(String::as_str));
        }
        evicted
    }

    /// Appends a mined block. Checks linkage, digest and proof-of-work, replays
    /// the ledger on a copy, then swaps it in; nothing changes on failure.
    pub fn commit_block(&mut self, block: Block) -> Result<(), ChainError> {
        let last_block = self.latest_block().ok_or_else(|| {
            ChainError::MiningError("Cannot commit to an empty chain".to_string())
        })?;

        if block.index != last_block.index + 1 {
            return Err(ChainError::MiningError(format!(
                "Invalid block index. Expected {}, but got {}.",
                last_block.index + 1,
                block.index
            )));
        }
        if block.previous_hash != last_block.hash {
            return Err(ChainError::MiningError(format!(
                "Block {} does not extend the current tip {}",
                block.index, last_block.hash
            )));
        }
        if !block.is_valid() {
            return Err(ChainError::MiningError(format!(
                "Block {} hash does not match its contents",
                block.index
            )));
        }
        if !miner::meets_difficulty(&block.hash, self.difficulty) {
            return Err(ChainError::MiningError(format!(
                "Block {} hash does not meet difficulty {}",
                block.index, self.difficulty
            )));
        }

        let mut next_state = self.state.clone();
        next_state
            .apply_block(&block)
            .map_err(|e| ChainError::MiningError(e.to_string()))?;

        self.mempool
            .remove_included(block.transactions.iter().map(|tx| tx.hash.as_str()));
        self.state = next_state;
        info!(
            index = block.index,
            hash = %block.hash,
            transactions = block.transactions.len(),
            "block committed"
        );
        self.blocks.push(block);
        self.prune_mempool();

        // Save failures are retried by the next save; never fatal here.
        if let Err(e) = self.save_snapshot() {
            warn!("Failed to persist chain snapshot: {}", e);
        }
        Ok(())
    }

    /// Builds, mines and appends a block in one synchronous call.
    pub fn mine_block(&mut self, miner_address: &str) -> Result<Block, ChainError> {
        self.prune_mempool();
        let mut block = self.prepare_block(miner_address)?;
        block.mine(self.difficulty)?;
        self.commit_block(block.clone())?;
        Ok(block)
    }

    /// Digest and link integrity of every block after genesis.
    pub fn is_chain_valid(&self) -> bool {
        verify_chain(&self.blocks).is_ok()
    }

    /// Committed balance plus the net effect of pending transactions, floored at zero.
    pub fn get_balance(&self, address: &str) -> u64 {
        let mut balance = self.state.get_balance(address) as i128;
        for tx in self.mempool.iter() {
            if tx.to == address {
                balance += tx.amount as i128;
            }
            if tx.from.as_deref() == Some(address) {
                balance -= tx.amount as i128;
            }
        }
        balance.clamp(0, u64::MAX as i128) as u64
    }

    pub fn get_block(&self, block_ref: &BlockRef) -> Option<&Block> {
        match block_ref {
            BlockRef::Latest => self.blocks.last(),
            BlockRef::Index(index) => self.blocks.get(*index as usize),
            BlockRef::Hash(hash) => self.blocks.iter().find(|b| &b.hash == hash),
        }
    }

    pub fn find_committed_transaction(&self, hash: &str) -> Option<(&Transaction, &Block)> {
        let index = *self.state.transaction_index.get(hash)?;
        let block = self.blocks.get(index as usize)?;
        let tx = block.transactions.iter().find(|tx| tx.hash == hash)?;
        Some((tx, block))
    }

    pub fn find_transaction(&self, hash: &str) -> Option<TransactionLocation<'_>> {
        if let Some((transaction, block)) = self.find_committed_transaction(hash) {
            return Some(TransactionLocation::Committed { transaction, block });
        }
        self.mempool
            .get_transaction(hash)
            .map(TransactionLocation::Pending)
    }

    /// Whether the address has appeared in a committed or pending transaction.
    pub fn address_known(&self, address: &str) -> bool {
        self.state.known_addresses.contains(address)
            || self.mempool.iter().any(|tx| tx.involves(address))
    }

    pub fn chain_info(&self) -> ChainInfo {
        let (latest_index, latest_hash) = self
            .latest_block()
            .map(|b| (b.index, b.hash.clone()))
            .unwrap_or_default();
        ChainInfo {
            height: self.height(),
            latest_index,
            latest_hash,
            difficulty: self.difficulty,
            mining_reward: self.mining_reward,
            mempool_size: self.mempool.len(),
            tokens: self.state.tokens.values().cloned().collect(),
            is_valid: self.is_chain_valid(),
        }
    }

    pub fn export_snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            chain: self.blocks.clone(),
            difficulty: self.difficulty,
            mining_reward: self.mining_reward,
            tokens: Some(self.state.tokens.values().cloned().collect()),
        }
    }

    pub fn export_json(&self) -> Result<String, ChainError> {
        serde_json::to_string(&self.export_snapshot())
            .map_err(|e| ChainError::PersistenceError(format!("Failed to serialize chain: {}", e)))
    }

    /// Replaces the live chain with `snapshot` only if it validates on its own,
    /// starts from the same genesis and is at least as long as the live chain.
    /// On any failure the live chain is left untouched.
    pub fn import_snapshot(&mut self, snapshot: ChainSnapshot) -> Result<(), ChainError> {
        validate_snapshot(&snapshot)?;
        if snapshot.chain.first() != self.blocks.first() {
            return Err(ChainError::ImportError(
                "Snapshot genesis does not match the local genesis".to_string(),
            ));
        }
        if snapshot.chain.len() < self.blocks.len() {
            return Err(ChainError::ImportError(format!(
                "Snapshot has {} blocks, local chain has {}",
                snapshot.chain.len(),
                self.blocks.len()
            )));
        }
        let state = LedgerState::rebuild(&snapshot.chain)
            .map_err(|e| ChainError::ImportError(e.to_string()))?;

        let ChainSnapshot {
            chain,
            difficulty,
            mining_reward,
            ..
        } = snapshot;

        let now_committed = self.mempool_hashes_in(&state);
        self.mempool
            .remove_included(now_committed.iter().map(String::as_str));
        self.blocks = chain;
        self.difficulty = difficulty;
        self.mining_reward = mining_reward;
        self.state = state;
        let evicted = self.prune_mempool();
        info!(
            height = self.height(),
            evicted = evicted.len(),
            "chain snapshot imported"
        );
        Ok(())
    }

    pub fn import_json(&mut self, json: &str) -> Result<(), ChainError> {
        let snapshot: ChainSnapshot = serde_json::from_str(json)?;
        self.import_snapshot(snapshot)
    }

    fn mempool_hashes_in(&self, state: &LedgerState) -> Vec<String> {
        self.mempool
            .iter()
            .filter(|tx| state.contains_transaction(&tx.hash))
            .map(|tx| tx.hash.clone())
            .collect()
    }

    /// Resubmits stored pending transactions; any that no longer pass
    /// submission checks are dropped.
    fn restore_pending(&mut self, pending: Vec<Transaction>) {
        let total = pending.len();
        let mut restored = 0;
        for tx in pending {
            let hash = tx.hash.clone();
            match self.submit_transaction(tx) {
                Ok(_) => restored += 1,
                Err(e) => warn!(tx = %hash, "dropping stored pending transaction: {}", e),
            }
        }
        if total > 0 {
            info!(restored, total, "pending transactions restored");
        }
    }

    pub fn save_snapshot(&self) -> Result<(), ChainError> {
        self.persistence.save_chain(&self.export_snapshot())?;
        self.save_pending()
    }

    pub fn save_pending(&self) -> Result<(), ChainError> {
        let pending: Vec<Transaction> = self.mempool.iter().cloned().collect();
        self.persistence.save_pending(&pending)
    }
}
