//! Proof-of-work nonce search.
//!
//! Difficulty is the number of leading hexadecimal `0` characters required in
//! a block's hex digest, not a count of leading zero bits.

use crate::blockchain::Block;
use crate::error::ChainError;

pub const MIN_DIFFICULTY: u32 = 1;
pub const MAX_DIFFICULTY: u32 = 6;

/// Attempts allowed by [`Block::mine`]. At difficulty 6 the expected number of
/// attempts is 16^6, so this cap is never reached by an honest search.
pub const DEFAULT_MAX_ATTEMPTS: u64 = 1 << 40;

pub fn validate_difficulty(difficulty: u32) -> Result<(), ChainError> {
    if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&difficulty) {
        return Err(ChainError::ValidationError(format!(
            "Difficulty must be between {} and {}, got {}",
            MIN_DIFFICULTY, MAX_DIFFICULTY, difficulty
        )));
    }
    Ok(())
}

/// Whether `hash` starts with `difficulty` hex zeros.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let required = difficulty as usize;
    hash.len() >= required && hash.bytes().take(required).all(|b| b == b'0')
}

/// Increments the block's nonce until its digest meets `difficulty`, giving up
/// after `max_attempts`. Returns the number of digests computed.
pub fn search_nonce(block: &mut Block, difficulty: u32, max_attempts: u64) -> Result<u64, ChainError> {
    validate_difficulty(difficulty)
        .map_err(|e| ChainError::MiningError(e.to_string()))?;

    let mut attempts = 0u64;
    loop {
        let hash = block.compute_digest();
        attempts += 1;
        if meets_difficulty(&hash, difficulty) {
            block.hash = hash;
            return Ok(attempts);
        }
        if attempts >= max_attempts {
            return Err(ChainError::MiningError(format!(
                "No nonce found for block {} after {} attempts",
                block.index, attempts
            )));
        }
        block.nonce = block.nonce.wrapping_add(1);
    }
}

/// Mines an owned block and hands it back, in the shape the background
/// worker in `node.rs` needs.
pub fn mine_block(mut block: Block, difficulty: u32) -> Result<Block, ChainError> {
    search_nonce(&mut block, difficulty, DEFAULT_MAX_ATTEMPTS)?;
    Ok(block)
}
