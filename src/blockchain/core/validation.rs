//! Stateless verification of transactions, blocks and whole chains.

use super::block::{Block, GENESIS_PREVIOUS_HASH};
use crate::error::{ChainError, Result};
use crate::transaction::{Transaction, TransactionStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Allowed clock skew for transaction timestamps, in milliseconds.
pub const MAX_CLOCK_SKEW_MS: u64 = 60_000;

/// Every block-level problem found by [`Validator::validate_chain`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub errors: Vec<String>,
}

impl ChainReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TamperIssue {
    BlockHashMismatch {
        block_index: u64,
        expected: String,
        actual: String,
    },
    MerkleRootMismatch {
        block_index: u64,
        expected: Option<String>,
        actual: Option<String>,
    },
    ChainBreak {
        block_index: u64,
        expected_previous: String,
        actual_previous: String,
    },
    TransactionHashMismatch {
        block_index: u64,
        transaction_id: String,
        expected: String,
        actual: String,
    },
}

impl TamperIssue {
    pub fn block_index(&self) -> u64 {
        match self {
            TamperIssue::BlockHashMismatch { block_index, .. }
            | TamperIssue::MerkleRootMismatch { block_index, .. }
            | TamperIssue::ChainBreak { block_index, .. }
            | TamperIssue::TransactionHashMismatch { block_index, .. } => *block_index,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TamperIssue::BlockHashMismatch { .. } => "block_hash_mismatch",
            TamperIssue::MerkleRootMismatch { .. } => "merkle_root_mismatch",
            TamperIssue::ChainBreak { .. } => "chain_break",
            TamperIssue::TransactionHashMismatch { .. } => "transaction_hash_mismatch",
        }
    }
}

impl std::fmt::Display for TamperIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TamperIssue::BlockHashMismatch { block_index, expected, actual } => write!(
                f,
                "block {}: block hash mismatch (expected {}, stored {})",
                block_index, expected, actual
            ),
            TamperIssue::MerkleRootMismatch { block_index, expected, actual } => write!(
                f,
                "block {}: merkle root mismatch (expected {:?}, stored {:?})",
                block_index, expected, actual
            ),
            TamperIssue::ChainBreak { block_index, expected_previous, actual_previous } => write!(
                f,
                "block {}: chain break (expected previous {}, stored {})",
                block_index, expected_previous, actual_previous
            ),
            TamperIssue::TransactionHashMismatch { block_index, transaction_id, expected, actual } => write!(
                f,
                "block {}: transaction {} hash mismatch (expected {}, stored {})",
                block_index, transaction_id, expected, actual
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TamperReport {
    pub tampered: bool,
    pub issues: Vec<TamperIssue>,
    pub checked_blocks: usize,
    pub checked_transactions: usize,
}

impl TamperReport {
    pub fn summary(&self) -> String {
        if !self.tampered {
            return format!(
                "no tampering found in {} blocks / {} transactions",
                self.checked_blocks, self.checked_transactions
            );
        }
        let details: Vec<String> = self.issues.iter().map(ToString::to_string).collect();
        format!("{} issue(s): {}", self.issues.len(), details.join("; "))
    }
}

pub struct Validator;

impl Validator {
    pub fn validate_transaction(tx: &Transaction) -> Result<()> {
        Self::validate_transaction_with_skew(tx, MAX_CLOCK_SKEW_MS)
    }

    /// Record checks plus a future-timestamp bound of `max_skew_ms`. Used
    /// when a transaction enters the ledger.
    pub fn validate_transaction_with_skew(tx: &Transaction, max_skew_ms: u64) -> Result<()> {
        Self::validate_record(tx)?;

        let latest_allowed = crate::now_millis().saturating_add(max_skew_ms);
        if tx.timestamp > latest_allowed {
            return Err(ChainError::Validation(format!(
                "Transaction {} timestamp {} is in the future",
                tx.transaction_id, tx.timestamp
            )));
        }

        Ok(())
    }

    /// Structural completeness, hash integrity and approval sanity. Does not
    /// read the wall clock.
    pub fn validate_record(tx: &Transaction) -> Result<()> {
        let required = [
            (tx.transaction_id.as_str(), "Transaction ID"),
            (tx.transaction_type.as_str(), "Transaction type"),
            (tx.module.as_str(), "Module"),
            (tx.from_wallet.as_str(), "Wallet address"),
            (tx.signature.as_str(), "Signature"),
        ];
        if let Some((_, field)) = required.iter().find(|(value, _)| value.is_empty()) {
            return Err(ChainError::Validation(format!("{} is required", field)));
        }

        if !tx.verify_integrity() {
            return Err(ChainError::Integrity(format!(
                "Transaction {} hash integrity check failed",
                tx.transaction_id
            )));
        }

        if tx.approval_required {
            if tx.approval_count_required == 0 {
                return Err(ChainError::Validation(
                    "Invalid approval count requirement".to_string(),
                ));
            }
            if tx.approvals.len() as u64 > u64::from(tx.approval_count_required) {
                return Err(ChainError::Validation(format!(
                    "Too many approvals: {}/{}",
                    tx.approvals.len(),
                    tx.approval_count_required
                )));
            }
        }

        // An approved or executed status has to be backed by the approvals themselves.
        if matches!(tx.status, TransactionStatus::Approved | TransactionStatus::Executed) {
            Self::validate_approval_chain(tx).map_err(|e| {
                ChainError::Validation(format!(
                    "Transaction {} is {} but {}",
                    tx.transaction_id, tx.status, e
                ))
            })?;
        }

        Ok(())
    }

    /// Block integrity, linkage to `previous`, genesis shape and contained transactions.
    pub fn validate_block(block: &Block, previous: Option<&Block>) -> Result<()> {
        if !block.verify_integrity() {
            return Err(ChainError::Integrity(format!(
                "Block {} hash integrity check failed",
                block.index
            )));
        }

        if let Some(prev) = previous {
            if block.previous_hash != prev.block_hash {
                return Err(ChainError::Linkage(format!(
                    "Block {} previous hash mismatch. Expected {}, but got {}.",
                    block.index, prev.block_hash, block.previous_hash
                )));
            }
            if block.index != prev.index + 1 {
                return Err(ChainError::Linkage(format!(
                    "Block index mismatch. Expected {}, but got {}.",
                    prev.index + 1,
                    block.index
                )));
            }
        }

        if block.index == 0 && block.previous_hash != GENESIS_PREVIOUS_HASH {
            return Err(ChainError::Linkage(
                "Invalid genesis block previous hash".to_string(),
            ));
        }

        for tx in &block.transactions {
            Self::validate_record(tx).map_err(|e| {
                ChainError::Validation(format!("Invalid transaction in block {}: {}", block.index, e))
            })?;
            if !tx.is_block_eligible() {
                return Err(ChainError::Validation(format!(
                    "Transaction {} in block {} is {} with {}/{} approvals",
                    tx.transaction_id,
                    block.index,
                    tx.status,
                    tx.approval_count(),
                    tx.approval_count_required
                )));
            }
        }

        if block.merkle_root != block.calculate_merkle_root() {
            return Err(ChainError::Integrity(format!(
                "Block {} merkle root mismatch",
                block.index
            )));
        }

        Ok(())
    }

    /// Collects every block-level error instead of stopping at the first.
    pub fn validate_chain(blocks: &[Block]) -> ChainReport {
        let mut report = ChainReport::default();

        let Some(genesis) = blocks.first() else {
            report.errors.push("Empty blockchain".to_string());
            return report;
        };
        if genesis.index != 0 {
            report.errors.push("Genesis block index is not 0".to_string());
        }
        if genesis.previous_hash != GENESIS_PREVIOUS_HASH {
            report.errors.push("Genesis block previous hash is not '0'".to_string());
        }

        for (i, block) in blocks.iter().enumerate() {
            let previous = if i > 0 { blocks.get(i - 1) } else { None };
            if let Err(e) = Self::validate_block(block, previous) {
                report.errors.push(format!("Block {}: {}", i, e));
            }
        }

        report
    }

    /// Enough approvals, each complete, no approver counted twice.
    pub fn validate_approval_chain(tx: &Transaction) -> Result<()> {
        if !tx.approval_required {
            return Ok(());
        }

        if (tx.approvals.len() as u64) < u64::from(tx.approval_count_required) {
            return Err(ChainError::Validation(format!(
                "Insufficient approvals: {}/{}",
                tx.approvals.len(),
                tx.approval_count_required
            )));
        }

        let mut seen = HashSet::new();
        for approval in &tx.approvals {
            if !seen.insert(approval.wallet.as_str()) {
                return Err(ChainError::Validation(format!(
                    "Duplicate approver detected: {}",
                    approval.wallet
                )));
            }
        }

        for approval in &tx.approvals {
            if approval.wallet.is_empty() {
                return Err(ChainError::Validation("Approval missing wallet address".to_string()));
            }
            if approval.signature.is_empty() {
                return Err(ChainError::Validation("Approval missing signature".to_string()));
            }
            if approval.role.is_empty() {
                return Err(ChainError::Validation("Approval missing role".to_string()));
            }
        }

        Ok(())
    }

    /// Re-derive every stored hash and report each mismatch and broken link.
    pub fn detect_tampering(blocks: &[Block]) -> TamperReport {
        let mut report = TamperReport::default();

        for (i, block) in blocks.iter().enumerate() {
            report.checked_blocks += 1;

            let expected_hash = block
                .calculate_hash()
                .unwrap_or_else(|e| format!("<unhashable: {}>", e));
            if expected_hash != block.block_hash {
                report.issues.push(TamperIssue::BlockHashMismatch {
                    block_index: block.index,
                    expected: expected_hash,
                    actual: block.block_hash.clone(),
                });
            }

            let expected_root = block.calculate_merkle_root();
            if expected_root != block.merkle_root {
                report.issues.push(TamperIssue::MerkleRootMismatch {
                    block_index: block.index,
                    expected: expected_root,
                    actual: block.merkle_root.clone(),
                });
            }

            if i > 0 {
                let previous = &blocks[i - 1];
                if block.previous_hash != previous.block_hash {
                    report.issues.push(TamperIssue::ChainBreak {
                        block_index: block.index,
                        expected_previous: previous.block_hash.clone(),
                        actual_previous: block.previous_hash.clone(),
                    });
                }
            }

            for tx in &block.transactions {
                report.checked_transactions += 1;
                let expected = tx
                    .calculate_hash()
                    .unwrap_or_else(|e| format!("<unhashable: {}>", e));
                if expected != tx.transaction_hash {
                    report.issues.push(TamperIssue::TransactionHashMismatch {
                        block_index: block.index,
                        transaction_id: tx.transaction_id.clone(),
                        expected,
                        actual: tx.transaction_hash.clone(),
                    });
                }
            }
        }

        report.tampered = !report.issues.is_empty();
        report
    }

    /// Replay protection across the whole committed chain, by hash and by id.
    pub fn validate_transaction_replay(tx: &Transaction, blocks: &[Block]) -> Result<()> {
        for block in blocks {
            for existing in &block.transactions {
                if existing.transaction_hash == tx.transaction_hash {
                    return Err(ChainError::Replay(format!(
                        "Transaction {} already exists in block {}",
                        tx.transaction_hash, block.index
                    )));
                }
                if existing.transaction_id == tx.transaction_id {
                    return Err(ChainError::Replay(format!(
                        "Transaction ID {} already used in block {}",
                        tx.transaction_id, block.index
                    )));
                }
            }
        }
        Ok(())
    }
}
