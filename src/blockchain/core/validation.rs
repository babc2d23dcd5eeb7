use crate::error::ChainError;
use crate::miner;
use std::collections::HashMap;

use super::chain::{Block, ChainSnapshot, GENESIS_PREVIOUS_HASH};

/// Rejects a block that carries the same transaction twice.
pub fn validate_no_duplicate_transactions(block: &Block) -> Result<(), ChainError> {
    let mut seen = HashMap::new();
    for (position, tx) in block.transactions.iter().enumerate() {
        if let Some(first) = seen.insert(tx.hash.as_str(), position) {
            return Err(ChainError::IntegrityError(format!(
                "Block {} includes transaction {} at positions {} and {}",
                block.index, tx.hash, first, position
            )));
        }
    }
    Ok(())
}

/// Digest and link check for every block after genesis. Proof-of-work is not
/// re-checked here since difficulty may have changed since a block was mined.
pub fn verify_chain(blocks: &[Block]) -> Result<(), ChainError> {
    for pair in blocks.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        if current.hash != current.compute_digest() {
            return Err(ChainError::IntegrityError(format!(
                "Block {} hash does not match its contents",
                current.index
            )));
        }
        if current.previous_hash != previous.hash {
            return Err(ChainError::IntegrityError(format!(
                "Block {} does not link to block {}",
                current.index, previous.index
            )));
        }
    }
    Ok(())
}

/// Structural checks on an imported chain, run before anything is replaced.
pub fn validate_snapshot(snapshot: &ChainSnapshot) -> Result<(), ChainError> {
    let import_err = |msg: String| ChainError::ImportError(msg);

    let genesis = snapshot
        .chain
        .first()
        .ok_or_else(|| import_err("Snapshot contains no blocks".to_string()))?;
    if genesis.index != 0 || genesis.previous_hash != GENESIS_PREVIOUS_HASH {
        return Err(import_err("First block is not a genesis block".to_string()));
    }
    if !genesis.is_valid() {
        return Err(import_err("Genesis hash does not match its contents".to_string()));
    }

    miner::validate_difficulty(snapshot.difficulty).map_err(|e| import_err(e.to_string()))?;

    for (position, block) in snapshot.chain.iter().enumerate() {
        if block.index != position as u64 {
            return Err(import_err(format!(
                "Block at position {} has index {}",
                position, block.index
            )));
        }
        validate_no_duplicate_transactions(block).map_err(|e| import_err(e.to_string()))?;
        for tx in &block.transactions {
            tx.validate().map_err(|e| {
                import_err(format!("Block {} transaction {}: {}", block.index, tx.hash, e))
            })?;
        }
    }

    verify_chain(&snapshot.chain).map_err(|e| import_err(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Blockchain;
    use crate::transaction::Transaction;

    fn mined_chain() -> Blockchain {
        let mut chain = Blockchain::new("GENESIS", 1).unwrap();
        let mut tx = Transaction::new_at(Some("GENESIS".into()), "alice", 10, None, 1);
        tx.sign();
        chain.submit_transaction(tx).unwrap();
        chain.mine_block("miner").unwrap();
        chain
    }

    #[test]
    fn test_verify_chain_accepts_mined_chain() {
        assert!(verify_chain(&mined_chain().blocks).is_ok());
    }

    #[test]
    fn test_duplicate_transaction_in_block() {
        let chain = mined_chain();
        let mut block = chain.blocks[1].clone();
        block.transactions.push(block.transactions[1].clone());
        assert!(matches!(
            validate_no_duplicate_transactions(&block),
            Err(ChainError::IntegrityError(_))
        ));
    }

    #[test]
    fn test_snapshot_without_genesis_rejected() {
        let chain = mined_chain();
        let mut snapshot = chain.export_snapshot();
        snapshot.chain.remove(0);
        assert!(matches!(
            validate_snapshot(&snapshot),
            Err(ChainError::ImportError(_))
        ));
    }

    #[test]
    fn test_snapshot_with_bad_difficulty_rejected() {
        let mut snapshot = mined_chain().export_snapshot();
        snapshot.difficulty = 12;
        assert!(validate_snapshot(&snapshot).is_err());
    }

    #[test]
    fn test_snapshot_with_forged_transaction_rejected() {
        let mut snapshot = mined_chain().export_snapshot();
        let block = &mut snapshot.chain[1];
        block.transactions[1].signature = Some("forged".into());
        block.hash = block.compute_digest();
        assert!(validate_snapshot(&snapshot).is_err());
    }
}
