use crate::error::{ChainError, Result};
use crate::hash::{hash_canonical, HexHash};
use crate::merkle::{MerkleProof, MerkleTree};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const BLOCK_VERSION: &str = "1.0.0";
/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Fields folded into the block hash. Transaction bodies only enter through
/// the Merkle root.
#[derive(Serialize)]
struct BlockHeaderView<'a> {
    index: u64,
    timestamp: u64,
    nonce: u64,
    previous_hash: &'a str,
    merkle_root: &'a Option<HexHash>,
    created_by: &'a str,
    version: &'a str,
    transaction_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub nonce: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: HexHash,
    pub merkle_root: Option<HexHash>,
    pub block_hash: HexHash,
    pub created_by: String,
    pub version: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Block {
    fn empty(index: u64) -> Self {
        Block {
            index,
            timestamp: crate::now_millis(),
            nonce: 0,
            transactions: Vec::new(),
            previous_hash: String::new(),
            merkle_root: None,
            block_hash: String::new(),
            created_by: String::new(),
            version: BLOCK_VERSION.to_string(),
            metadata: Map::new(),
        }
    }

    pub fn transaction_hashes(&self) -> Vec<HexHash> {
        self.transactions.iter().map(|tx| tx.transaction_hash.clone()).collect()
    }

    pub fn calculate_merkle_root(&self) -> Option<HexHash> {
        if self.transactions.is_empty() {
            return None;
        }
        MerkleTree::new(self.transaction_hashes()).root_hash().map(str::to_string)
    }

    pub fn calculate_hash(&self) -> Result<HexHash> {
        hash_canonical(&BlockHeaderView {
            index: self.index,
            timestamp: self.timestamp,
            nonce: self.nonce,
            previous_hash: &self.previous_hash,
            merkle_root: &self.merkle_root,
            created_by: &self.created_by,
            version: &self.version,
            transaction_count: self.transactions.len(),
        })
    }

    /// Refresh the Merkle root, then the block hash.
    pub fn recalculate_hash(&mut self) -> Result<&str> {
        self.merkle_root = self.calculate_merkle_root();
        self.block_hash = self.calculate_hash()?;
        Ok(&self.block_hash)
    }

    /// Append a transaction to a block that has not been committed yet.
    pub fn add_transaction(&mut self, transaction: Transaction) -> Result<()> {
        if !transaction.verify_integrity() {
            return Err(ChainError::Integrity(format!(
                "Transaction {} failed its hash check and cannot enter block {}",
                transaction.transaction_id, self.index
            )));
        }
        self.transactions.push(transaction);
        if let Err(e) = self.recalculate_hash() {
            self.transactions.pop();
            self.recalculate_hash()?;
            return Err(e);
        }
        Ok(())
    }

    /// Recompute hash and Merkle root and check every contained transaction.
    pub fn verify_integrity(&self) -> bool {
        match self.calculate_hash() {
            Ok(expected) if expected == self.block_hash => {}
            _ => return false,
        }
        if self.calculate_merkle_root() != self.merkle_root {
            return false;
        }
        self.transactions.iter().all(Transaction::verify_integrity)
    }

    pub fn get_proof(&self, transaction_hash: &str) -> Option<MerkleProof> {
        if !self.transactions.iter().any(|tx| tx.transaction_hash == transaction_hash) {
            return None;
        }
        Some(MerkleTree::new(self.transaction_hashes()).get_proof(transaction_hash))
    }

    /// Membership check through a Merkle proof against the stored root,
    /// rather than trusting the transaction list.
    pub fn verify_transaction_inclusion(&self, transaction_hash: &str) -> bool {
        let Some(root) = self.merkle_root.as_deref() else {
            return false;
        };
        match self.get_proof(transaction_hash) {
            Some(proof) => MerkleTree::verify_proof(transaction_hash, &proof, root),
            None => false,
        }
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn transactions_by_type(&self, transaction_type: &str) -> Vec<&Transaction> {
        self.transactions
            .iter()
            .filter(|tx| tx.transaction_type == transaction_type)
            .collect()
    }

    pub fn transactions_by_module(&self, module: &str) -> Vec<&Transaction> {
        self.transactions.iter().filter(|tx| tx.module == module).collect()
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    pub fn hash_short(&self) -> &str {
        let end = self.block_hash.len().min(12);
        &self.block_hash[..end]
    }
}

/// Staged construction for blocks. The hash is frozen by [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    block: Block,
}

impl BlockBuilder {
    pub fn new(index: u64) -> Self {
        BlockBuilder { block: Block::empty(index) }
    }

    pub fn previous_hash(mut self, previous_hash: impl Into<HexHash>) -> Self {
        self.block.previous_hash = previous_hash.into();
        self
    }

    pub fn created_by(mut self, wallet: impl Into<String>) -> Self {
        self.block.created_by = wallet.into();
        self
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.block.timestamp = timestamp;
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.block.metadata = metadata;
        self
    }

    pub fn add_transaction(mut self, transaction: Transaction) -> Result<Self> {
        self.block.add_transaction(transaction)?;
        Ok(self)
    }

    pub fn add_transactions(mut self, transactions: impl IntoIterator<Item = Transaction>) -> Result<Self> {
        for tx in transactions {
            self.block.add_transaction(tx)?;
        }
        Ok(self)
    }

    pub fn build(mut self) -> Result<Block> {
        self.block.recalculate_hash()?;
        Ok(self.block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionBuilder;
    use serde_json::json;

    fn tx(n: u64) -> Transaction {
        TransactionBuilder::new()
            .transaction_type("sale_recorded")
            .module("sales")
            .contract("sales_invoice_contract")
            .data(json!({"invoice": n}))
            .wallet("0x2222222222222222222222222222222222222222")
            .signature("sig")
            .nonce(n)
            .build()
            .unwrap()
    }

    fn block_with(n: u64) -> Block {
        BlockBuilder::new(1)
            .previous_hash("abc")
            .created_by("0xCEO")
            .add_transactions((0..n).map(tx))
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_block_has_no_merkle_root() {
        let block = BlockBuilder::new(3).previous_hash("p").build().unwrap();
        assert!(block.merkle_root.is_none());
        assert!(block.verify_integrity());
        assert!(!block.verify_transaction_inclusion("whatever"));
    }

    #[test]
    fn test_built_block_verifies() {
        let block = block_with(5);
        assert_eq!(block.transaction_count(), 5);
        assert!(block.merkle_root.is_some());
        assert!(block.verify_integrity());
        assert_eq!(block.nonce, 0);
        assert_eq!(block.version, BLOCK_VERSION);
    }

    #[test]
    fn test_rejects_tampered_transaction() {
        let mut bad = tx(1);
        bad.data = json!({"invoice": 999});
        let err = BlockBuilder::new(1).add_transaction(bad).unwrap_err();
        assert!(matches!(err, ChainError::Integrity(_)));
    }

    #[test]
    fn test_header_edit_breaks_integrity() {
        let mut block = block_with(2);
        block.created_by = "0xMallory".into();
        assert!(!block.verify_integrity());
    }

    #[test]
    fn test_metadata_is_not_hashed() {
        let mut block = block_with(2);
        block.metadata.insert("note".into(), json!("annotated"));
        assert!(block.verify_integrity());
    }

    #[test]
    fn test_swapped_transactions_break_merkle_root() {
        let mut block = block_with(3);
        block.transactions.swap(0, 2);
        assert!(!block.verify_integrity());
    }

    #[test]
    fn test_transaction_body_edit_breaks_integrity_only_via_tx() {
        let mut block = block_with(3);
        block.transactions[1].data = json!({"invoice": -1});
        assert_eq!(block.calculate_hash().unwrap(), block.block_hash);
        assert!(!block.verify_integrity());
    }

    #[test]
    fn test_inclusion_proof() {
        let block = block_with(4);
        for t in &block.transactions {
            assert!(block.verify_transaction_inclusion(&t.transaction_hash));
        }
        assert!(!block.verify_transaction_inclusion(&tx(42).transaction_hash));
        assert!(block.get_proof("missing").is_none());
    }

    #[test]
    fn test_inclusion_fails_against_forged_root() {
        let mut block = block_with(4);
        let target = block.transactions[2].transaction_hash.clone();
        block.merkle_root = Some("00".repeat(32));
        assert!(!block.verify_transaction_inclusion(&target));
    }

    #[test]
    fn test_filters() {
        let block = block_with(2);
        assert_eq!(block.transactions_by_type("sale_recorded").len(), 2);
        assert_eq!(block.transactions_by_module("hr").len(), 0);
    }
}
