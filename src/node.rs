use crate::blockchain::{Block, Blockchain, ChainSnapshot};
use crate::clock::{system_clock, SharedClock};
use crate::config::{Config, NodeRole};
use crate::error::ChainError;
use crate::governance::GovernanceSystems;
use crate::miner;
use crate::persistence::{Database, InMemoryPersistence, Persistence};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Booting,
    Ready,
    Degraded,
}

/// Owns the chain, the governance systems and the background loops.
///
/// Lock order is governance before blockchain. `chain_work` serialises manual
/// mining, manual saves and their timer-driven counterparts.
pub struct Node {
    pub config: Config,
    pub persistence: Arc<dyn Persistence>,
    pub blockchain: Arc<RwLock<Blockchain>>,
    pub governance: Arc<RwLock<GovernanceSystems>>,
    pub state: Arc<RwLock<NodeState>>,
    chain_work: Arc<Mutex<()>>,
}

impl Node {
    /// Opens the configured database, falling back to in-memory persistence.
    pub fn open(config: Config) -> Result<Self, ChainError> {
        let persistence: Arc<dyn Persistence> = match Database::open(&config.database.path) {
            Ok(db) => Arc::new(db),
            Err(e) => {
                warn!(
                    "Failed to open DB at {}: {}. Falling back to in-memory persistence.",
                    config.database.path, e
                );
                Arc::new(InMemoryPersistence::new())
            }
        };
        Self::with_parts(config, system_clock(), persistence)
    }

    pub fn with_parts(
        config: Config,
        clock: SharedClock,
        persistence: Arc<dyn Persistence>,
    ) -> Result<Self, ChainError> {
        config.validate()?;
        let blockchain = Blockchain::load_or_genesis(&config.chain, clock, persistence.clone())?;

        let governance = match persistence.load_governance() {
            Ok(Some(snapshot)) => GovernanceSystems::restore(&config.governance, snapshot),
            Ok(None) => GovernanceSystems::new(&config.governance),
            Err(e) => {
                warn!("Failed to load governance state: {}. Starting empty.", e);
                GovernanceSystems::new(&config.governance)
            }
        };

        info!(
            height = blockchain.height(),
            difficulty = blockchain.difficulty,
            role = ?config.node.role,
            "node initialised"
        );

        Ok(Self {
            config,
            persistence,
            blockchain: Arc::new(RwLock::new(blockchain)),
            governance: Arc::new(RwLock::new(governance)),
            state: Arc::new(RwLock::new(NodeState::Booting)),
            chain_work: Arc::new(Mutex::new(())),
        })
    }

    pub async fn node_state(&self) -> NodeState {
        *self.state.read().await
    }

    /// Mines one block. The nonce search runs on the blocking pool so readers
    /// are not held up; submissions that arrive meanwhile stay pending.
    pub async fn mine(&self, miner_address: &str) -> Result<Block, ChainError> {
        let _work = self.chain_work.lock().await;

        self.blockchain.write().await.prune_mempool();
        let (candidate, difficulty) = {
            let chain = self.blockchain.read().await;
            (chain.prepare_block(miner_address)?, chain.difficulty)
        };

        let mined = tokio::task::spawn_blocking(move || miner::mine_block(candidate, difficulty))
            .await
            .map_err(|e| ChainError::MiningError(format!("Mining task failed: {}", e)))??;

        self.blockchain.write().await.commit_block(mined.clone())?;
        info!(index = mined.index, nonce = mined.nonce, "mined new block");
        Ok(mined)
    }

    /// Replaces the chain with a validated snapshot; the live chain is kept on failure.
    pub async fn import_chain(&self, snapshot: ChainSnapshot) -> Result<(), ChainError> {
        let _work = self.chain_work.lock().await;
        let mut chain = self.blockchain.write().await;
        if let Err(e) = chain.import_snapshot(snapshot) {
            warn!("Chain import rejected: {}", e);
            return Err(e);
        }
        if let Err(e) = chain.save_snapshot() {
            warn!("Failed to persist imported chain: {}", e);
        }
        Ok(())
    }

    /// Writes chain and governance snapshots plus the pending pool.
    pub async fn save(&self) -> Result<(), ChainError> {
        let _work = self.chain_work.lock().await;
        let governance = self.governance.read().await.snapshot();
        let (chain, pending) = {
            let blockchain = self.blockchain.read().await;
            let pending: Vec<_> = blockchain.mempool.iter().cloned().collect();
            (blockchain.export_snapshot(), pending)
        };
        self.persistence.save_chain(&chain)?;
        self.persistence.save_governance(&governance)?;
        self.persistence.save_pending(&pending)?;
        debug!(height = chain.chain.len(), "snapshot saved");
        Ok(())
    }

    /// Persists governance state and the effects it queued after a mutating
    /// call. Failures are logged; the next auto-save retries.
    pub async fn checkpoint_governance(&self) {
        let governance = self.governance.read().await;
        if let Err(e) = self.persistence.save_governance(&governance.snapshot()) {
            warn!("Failed to checkpoint governance state: {}", e);
        }
        if let Err(e) = self.blockchain.read().await.save_pending() {
            warn!("Failed to checkpoint pending transactions: {}", e);
        }
    }

    /// Runs a full integrity check and moves the node to `Ready` or `Degraded`.
    pub async fn validate(&self) -> bool {
        let valid = self.blockchain.read().await.is_chain_valid();
        let mut state = self.state.write().await;
        let next = if valid {
            NodeState::Ready
        } else {
            NodeState::Degraded
        };
        if *state != next {
            if valid {
                info!("chain validation passed; node ready");
            } else {
                error!("chain validation failed; node degraded");
            }
        }
        *state = next;
        valid
    }

    /// Starts the role's background loops plus auto-save.
    pub fn spawn_background(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        match self.config.node.role {
            NodeRole::Miner => {
                let node = self.clone();
                let period = self.config.node.auto_mine_interval;
                let miner_address = self.config.node.miner_address.clone();
                handles.push(tokio::spawn(async move {
                    let mut ticker = every(period);
                    loop {
                        ticker.tick().await;
                        if node.blockchain.read().await.mempool.is_empty() {
                            continue;
                        }
                        if let Err(e) = node.mine(&miner_address).await {
                            warn!("Auto-mine failed: {}", e);
                        }
                    }
                }));
            }
            NodeRole::Validator => {
                let node = self.clone();
                let period = self.config.node.validate_interval;
                handles.push(tokio::spawn(async move {
                    let mut ticker = every(period);
                    loop {
                        ticker.tick().await;
                        node.validate().await;
                    }
                }));
            }
        }

        let node = self.clone();
        let period = self.config.node.auto_save_interval;
        handles.push(tokio::spawn(async move {
            let mut ticker = every(period);
            // the first tick fires immediately; nothing to save yet
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = node.save().await {
                    warn!("Auto-save failed: {}", e);
                }
            }
        }));

        handles
    }

    pub async fn start(self: Arc<Self>) -> Result<(), ChainError> {
        if !self.validate().await {
            warn!("Loaded chain failed validation; continuing in degraded state");
        }
        let _background = self.spawn_background();

        let port = self.config.node.rpc_port;
        Node::start_rpc(self.clone(), port).await
    }

    #[cfg(feature = "api")]
    async fn start_rpc(node: Arc<Self>, port: u16) -> Result<(), ChainError> {
        crate::rpc::serve(node, port).await
    }

    #[cfg(not(feature = "api"))]
    async fn start_rpc(node: Arc<Self>, _port: u16) -> Result<(), ChainError> {
        warn!("RPC feature not enabled in this build; running background loops only");
        loop {
            info!(
                "Node running: chain height = {}",
                node.blockchain.read().await.height()
            );
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
    }
}

fn every(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker
}
