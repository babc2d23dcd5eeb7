//! Database persistence layer for govchain

use crate::blockchain::{Block, ChainSnapshot, TokenInfo};
use crate::error::ChainError;
use crate::governance::GovernanceSnapshot;
use crate::transaction::Transaction;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// Abstraction for persistence backends. Implementations should provide
/// atomic saving/loading of chain and governance snapshots and of the
/// pending transaction pool.
pub trait Persistence: Send + Sync {
    fn save_chain(&self, snapshot: &ChainSnapshot) -> Result<(), ChainError>;
    fn load_chain(&self) -> Result<Option<ChainSnapshot>, ChainError>;
    fn save_governance(&self, snapshot: &GovernanceSnapshot) -> Result<(), ChainError>;
    fn load_governance(&self) -> Result<Option<GovernanceSnapshot>, ChainError>;
    fn save_pending(&self, pending: &[Transaction]) -> Result<(), ChainError>;
    fn load_pending(&self) -> Result<Vec<Transaction>, ChainError>;
}

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> ChainError + '_ {
    move |e| ChainError::PersistenceError(format!("{}: {}", context, e))
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, ChainError> {
        if path != ":memory:" {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let conn = Connection::open(path).map_err(db_err("Failed to open database"))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                height INTEGER PRIMARY KEY,
                hash TEXT NOT NULL,
                previous_hash TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                nonce INTEGER NOT NULL,
                transactions TEXT NOT NULL
            )",
            [],
        )
        .map_err(db_err("Failed to create blocks table"))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(db_err("Failed to create metadata table"))?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, ChainError> {
        self.conn
            .lock()
            .map_err(|_| ChainError::PersistenceError("Mutex poisoned".to_string()))
    }

    fn read_metadata(conn: &Connection, key: &str) -> Result<Option<String>, ChainError> {
        conn.query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err("Failed to read metadata"))
    }

    /// Atomically replaces the stored chain with `snapshot`.
    pub fn save_chain(&self, snapshot: &ChainSnapshot) -> Result<(), ChainError> {
        let conn_guard = self.lock()?;
        let tx = conn_guard
            .unchecked_transaction()
            .map_err(db_err("Failed to start transaction"))?;

        tx.execute(
            "DELETE FROM blocks WHERE height >= ?1",
            params![snapshot.chain.len() as i64],
        )
        .map_err(db_err("Failed to trim blocks"))?;

        for block in &snapshot.chain {
            let transactions_json = serde_json::to_string(&block.transactions).map_err(|e| {
                ChainError::PersistenceError(format!("Failed to serialize transactions: {}", e))
            })?;
            tx.execute(
                "INSERT OR REPLACE INTO blocks (height, hash, previous_hash, timestamp, nonce, transactions)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    block.index as i64,
                    block.hash,
                    block.previous_hash,
                    block.timestamp as i64,
                    block.nonce as i64,
                    transactions_json,
                ],
            )
            .map_err(db_err("Failed to save block"))?;
        }

        let tokens_json = serde_json::to_string(&snapshot.tokens).map_err(|e| {
            ChainError::PersistenceError(format!("Failed to serialize tokens: {}", e))
        })?;
        for (key, value) in [
            ("difficulty", snapshot.difficulty.to_string()),
            ("mining_reward", snapshot.mining_reward.to_string()),
            ("tokens", tokens_json),
        ] {
            tx.execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(db_err("Failed to save metadata"))?;
        }

        tx.commit().map_err(db_err("Failed to commit transaction"))?;
        Ok(())
    }

    pub fn load_chain(&self) -> Result<Option<ChainSnapshot>, ChainError> {
        let conn_guard = self.lock()?;
        let mut stmt = conn_guard
            .prepare(
                "SELECT height, hash, previous_hash, timestamp, nonce, transactions
                 FROM blocks ORDER BY height ASC",
            )
            .map_err(db_err("Failed to prepare query"))?;

        let rows = stmt
            .query_map([], |row| {
                let height: i64 = row.get(0)?;
                let hash: String = row.get(1)?;
                let previous_hash: String = row.get(2)?;
                let timestamp: i64 = row.get(3)?;
                let nonce: i64 = row.get(4)?;
                let transactions_json: String = row.get(5)?;
                Ok((height, hash, previous_hash, timestamp, nonce, transactions_json))
            })
            .map_err(db_err("Failed to query blocks"))?;

        let mut chain = Vec::new();
        for row in rows {
            let (height, hash, previous_hash, timestamp, nonce, transactions_json) =
                row.map_err(db_err("Failed to load block"))?;
            let transactions: Vec<Transaction> = serde_json::from_str(&transactions_json)
                .map_err(|e| {
                    ChainError::PersistenceError(format!(
                        "Failed to deserialize transactions of block {}: {}",
                        height, e
                    ))
                })?;
            chain.push(Block {
                index: height as u64,
                timestamp: timestamp as u64,
                transactions,
                previous_hash,
                nonce: nonce as u64,
                hash,
            });
        }

        if chain.is_empty() {
            return Ok(None);
        }

        let difficulty = Self::read_metadata(&conn_guard, "difficulty")?
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(|| ChainError::PersistenceError("Stored difficulty missing".to_string()))?;
        let mining_reward = Self::read_metadata(&conn_guard, "mining_reward")?
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| {
                ChainError::PersistenceError("Stored mining reward missing".to_string())
            })?;
        let tokens: Option<Vec<TokenInfo>> = match Self::read_metadata(&conn_guard, "tokens")? {
            Some(json) => serde_json::from_str(&json).map_err(|e| {
                ChainError::PersistenceError(format!("Failed to deserialize tokens: {}", e))
            })?,
            None => None,
        };

        Ok(Some(ChainSnapshot {
            chain,
            difficulty,
            mining_reward,
            tokens,
        }))
    }

    pub fn save_governance(&self, snapshot: &GovernanceSnapshot) -> Result<(), ChainError> {
        let json = serde_json::to_string(snapshot).map_err(|e| {
            ChainError::PersistenceError(format!("Failed to serialize governance: {}", e))
        })?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('governance', ?1)",
            params![json],
        )
        .map_err(db_err("Failed to save governance"))?;
        Ok(())
    }

    pub fn load_governance(&self) -> Result<Option<GovernanceSnapshot>, ChainError> {
        let conn = self.lock()?;
        match Self::read_metadata(&conn, "governance")? {
            Some(json) => serde_json::from_str(&json).map(Some).map_err(|e| {
                ChainError::PersistenceError(format!("Failed to deserialize governance: {}", e))
            }),
            None => Ok(None),
        }
    }

    /// Replaces the stored mempool.
    pub fn save_pending(&self, pending: &[Transaction]) -> Result<(), ChainError> {
        let json = serde_json::to_string(pending).map_err(|e| {
            ChainError::PersistenceError(format!("Failed to serialize mempool: {}", e))
        })?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('mempool', ?1)",
            params![json],
        )
        .map_err(db_err("Failed to save mempool"))?;
        Ok(())
    }

    pub fn load_pending(&self) -> Result<Vec<Transaction>, ChainError> {
        let conn = self.lock()?;
        match Self::read_metadata(&conn, "mempool")? {
            Some(json) => serde_json::from_str(&json).map_err(|e| {
                ChainError::PersistenceError(format!("Failed to deserialize mempool: {}", e))
            }),
            None => Ok(Vec::new()),
        }
    }
}

// Implement the Persistence trait for the rusqlite-backed Database
impl Persistence for Database {
    fn save_chain(&self, snapshot: &ChainSnapshot) -> Result<(), ChainError> {
        Database::save_chain(self, snapshot)
    }

    fn load_chain(&self) -> Result<Option<ChainSnapshot>, ChainError> {
        Database::load_chain(self)
    }

    fn save_governance(&self, snapshot: &GovernanceSnapshot) -> Result<(), ChainError> {
        Database::save_governance(self, snapshot)
    }

    fn load_governance(&self) -> Result<Option<GovernanceSnapshot>, ChainError> {
        Database::load_governance(self)
    }

    fn save_pending(&self, pending: &[Transaction]) -> Result<(), ChainError> {
        Database::save_pending(self, pending)
    }

    fn load_pending(&self) -> Result<Vec<Transaction>, ChainError> {
        Database::load_pending(self)
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    pub chain: Arc<parking_lot::Mutex<Option<ChainSnapshot>>>,
    pub governance: Arc<parking_lot::Mutex<Option<GovernanceSnapshot>>>,
    pub pending: Arc<parking_lot::Mutex<Vec<Transaction>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn save_chain(&self, snapshot: &ChainSnapshot) -> Result<(), ChainError> {
        *self.chain.lock() = Some(snapshot.clone());
        Ok(())
    }

    fn load_chain(&self) -> Result<Option<ChainSnapshot>, ChainError> {
        Ok(self.chain.lock().clone())
    }

    fn save_governance(&self, snapshot: &GovernanceSnapshot) -> Result<(), ChainError> {
        *self.governance.lock() = Some(snapshot.clone());
        Ok(())
    }

    fn load_governance(&self) -> Result<Option<GovernanceSnapshot>, ChainError> {
        Ok(self.governance.lock().clone())
    }

    fn save_pending(&self, pending: &[Transaction]) -> Result<(), ChainError> {
        *self.pending.lock() = pending.to_vec();
        Ok(())
    }

    fn load_pending(&self) -> Result<Vec<Transaction>, ChainError> {
        Ok(self.pending.lock().clone())
    }
}
