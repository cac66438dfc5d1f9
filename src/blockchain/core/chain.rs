use super::block::{Block, BlockBuilder, BLOCK_VERSION};
use super::genesis::{create_enriched_genesis_block, create_genesis_block, GENESIS_CREATOR};
use super::validation::{ChainReport, TamperReport, Validator, MAX_CLOCK_SKEW_MS};
use crate::error::{ChainError, Result};
use crate::persistence::{BlockStore, InMemoryPersistence};
use crate::rbac::RoleManager;
use crate::transaction::{Transaction, TransactionStatus};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_TRANSACTIONS_PER_BLOCK: usize = 100;

#[derive(Debug, Clone)]
pub struct LedgerSettings {
    /// Default `created_by` for sealed blocks.
    pub creator_wallet: String,
    pub max_transactions_per_block: usize,
    pub max_clock_skew_ms: u64,
    /// Seed a fresh store with the system configuration and role table.
    pub enriched_genesis: bool,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            creator_wallet: GENESIS_CREATOR.to_string(),
            max_transactions_per_block: DEFAULT_MAX_TRANSACTIONS_PER_BLOCK,
            max_clock_skew_ms: MAX_CLOCK_SKEW_MS,
            enriched_genesis: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStats {
    pub total_blocks: u64,
    pub total_transactions: u64,
    pub pending_transactions: u64,
    pub latest_block_index: u64,
    pub latest_block_hash: String,
    pub chain_valid: bool,
    pub genesis_timestamp: u64,
}

/// The committed block sequence plus the pool of transactions waiting to be sealed.
///
/// Blocks only ever leave this type as shared references. A block is
/// appended in memory after the store has accepted it, so the in-memory
/// chain never runs ahead of what is durable.
pub struct Ledger {
    blocks: Vec<Block>,
    pending: Vec<Transaction>,
    hash_index: HashMap<String, usize>,
    store: Box<dyn BlockStore>,
    settings: LedgerSettings,
    read_only: bool,
}

impl Ledger {
    /// Open a ledger over `store` with default settings.
    pub fn new(store: Box<dyn BlockStore>) -> Result<Self> {
        Self::with_config(store, LedgerSettings::default())
    }

    /// Ephemeral ledger backed by an in-memory store.
    pub fn in_memory() -> Result<Self> {
        Self::new(Box::new(InMemoryPersistence::new()))
    }

    /// Load every persisted block, creating genesis on an empty store.
    /// A chain that fails verification is refused with `ChainError::Corruption`.
    pub fn with_config(store: Box<dyn BlockStore>, settings: LedgerSettings) -> Result<Self> {
        Self::load(store, settings, true)
    }

    /// Load without trusting the store. A corrupt chain is kept read-only so
    /// tamper diagnostics can still run against it. An empty store is refused
    /// rather than given a genesis block.
    pub fn open_for_audit(store: Box<dyn BlockStore>) -> Result<Self> {
        Self::load(store, LedgerSettings::default(), false)
    }

    fn load(store: Box<dyn BlockStore>, settings: LedgerSettings, strict: bool) -> Result<Self> {
        let mut blocks = store.load_blocks()?;

        if blocks.is_empty() {
            if !strict {
                return Err(ChainError::NotFound("Store holds no blocks to audit".to_string()));
            }
            let genesis = if settings.enriched_genesis {
                create_enriched_genesis_block(&RoleManager::new(), settings.max_transactions_per_block)?
            } else {
                create_genesis_block(Map::new())?
            };
            store.save_block(&genesis)?;
            info!(hash = %genesis.hash_short(), "Created genesis block");
            blocks.push(genesis);
        } else {
            info!(blocks = blocks.len(), "Loaded blocks from store");
        }

        let hash_index = blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (b.block_hash.clone(), i))
            .collect();

        let mut ledger = Ledger {
            blocks,
            pending: Vec::new(),
            hash_index,
            store,
            settings,
            read_only: false,
        };

        let report = ledger.chain_report();
        if !report.is_valid() {
            let tampering = ledger.detect_tampering();
            let detail = if tampering.tampered {
                tampering.summary()
            } else {
                report.errors.join("; ")
            };
            warn!(%detail, "Loaded chain failed verification");
            if strict {
                return Err(ChainError::Corruption(detail));
            }
            ledger.read_only = true;
        }

        Ok(ledger)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(ChainError::Corruption(
                "Ledger was opened for audit over a corrupt chain and is read-only".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Pending pool
    // ------------------------------------------------------------------

    /// Validate and queue a transaction. Returns the hash it is stored under,
    /// which differs from the input hash when it gets linked to the previous
    /// pending transaction.
    pub fn add_transaction(&mut self, mut tx: Transaction) -> Result<String> {
        self.ensure_writable()?;

        if let Err(e) = Validator::validate_transaction_with_skew(&tx, self.settings.max_clock_skew_ms) {
            warn!(id = %tx.transaction_id, error = %e, "Rejected transaction");
            return Err(e);
        }

        if let Some(last) = self.pending.last() {
            if tx.previous_transaction_hash.as_deref() != Some(last.transaction_hash.as_str()) {
                tx.previous_transaction_hash = Some(last.transaction_hash.clone());
                tx.recalculate_hash()?;
            }
        }

        Validator::validate_transaction_replay(&tx, &self.blocks)?;
        if let Some(existing) = self.pending.iter().find(|p| {
            p.transaction_id == tx.transaction_id || p.transaction_hash == tx.transaction_hash
        }) {
            return Err(ChainError::Replay(format!(
                "Transaction {} is already pending",
                existing.transaction_id
            )));
        }

        let hash = tx.transaction_hash.clone();
        debug!(id = %tx.transaction_id, hash = %tx.hash_short(), "Queued transaction");
        self.pending.push(tx);
        Ok(hash)
    }

    /// Restore a previously saved pending pool. Transactions keep their
    /// stored links and hashes; each is still validated and replay-checked.
    pub fn import_pending(&mut self, transactions: Vec<Transaction>) -> Result<usize> {
        self.ensure_writable()?;
        let mut restored = Vec::with_capacity(transactions.len());
        for tx in transactions {
            Validator::validate_transaction_with_skew(&tx, self.settings.max_clock_skew_ms)?;
            Validator::validate_transaction_replay(&tx, &self.blocks)?;
            if self
                .pending
                .iter()
                .chain(restored.iter())
                .any(|p: &Transaction| p.transaction_id == tx.transaction_id)
            {
                return Err(ChainError::Replay(format!(
                    "Transaction {} is already pending",
                    tx.transaction_id
                )));
            }
            restored.push(tx);
        }
        let count = restored.len();
        self.pending.extend(restored);
        debug!(count, "Restored pending transactions");
        Ok(count)
    }

    fn pending_mut(&mut self, transaction_id: &str) -> Result<&mut Transaction> {
        self.pending
            .iter_mut()
            .find(|tx| tx.transaction_id == transaction_id)
            .ok_or_else(|| {
                ChainError::NotFound(format!("No pending transaction with id {}", transaction_id))
            })
    }

    /// Record an approval on a pending transaction. Eligibility of the
    /// approver must already have been checked.
    pub fn approve_pending(
        &mut self,
        transaction_id: &str,
        wallet: &str,
        signature: &str,
        role: &str,
    ) -> Result<&Transaction> {
        self.ensure_writable()?;
        let tx = self.pending_mut(transaction_id)?;
        tx.add_approval(wallet, signature, role)?;
        debug!(
            id = %transaction_id,
            approvals = tx.approval_count(),
            required = tx.approval_count_required,
            status = %tx.status,
            "Approval recorded"
        );
        Ok(&*tx)
    }

    pub fn reject_pending(
        &mut self,
        transaction_id: &str,
        wallet: &str,
        signature: &str,
        role: &str,
        reason: &str,
    ) -> Result<&Transaction> {
        self.ensure_writable()?;
        let tx = self.pending_mut(transaction_id)?;
        tx.reject(wallet, signature, role, reason)?;
        debug!(id = %transaction_id, %reason, "Transaction rejected");
        Ok(&*tx)
    }

    pub fn execute_pending(&mut self, transaction_id: &str) -> Result<&Transaction> {
        self.ensure_writable()?;
        let tx = self.pending_mut(transaction_id)?;
        tx.mark_executed()?;
        debug!(id = %transaction_id, "Transaction executed");
        Ok(&*tx)
    }

    /// Remove rejected transactions from the pool and hand them back.
    pub fn discard_rejected(&mut self) -> Vec<Transaction> {
        let (rejected, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|tx| tx.status == TransactionStatus::Rejected);
        self.pending = kept;
        rejected
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// Seal up to `max` eligible pending transactions into the next block.
    /// Returns `Ok(None)` when nothing is eligible.
    pub fn create_block(&mut self, creator: &str, max: Option<usize>) -> Result<Option<Block>> {
        self.ensure_writable()?;
        let limit = max.unwrap_or(self.settings.max_transactions_per_block);

        let selected: Vec<Transaction> = self
            .pending
            .iter()
            .filter(|tx| tx.is_block_eligible())
            .take(limit)
            .cloned()
            .collect();
        if selected.is_empty() {
            return Ok(None);
        }

        let tip = self.tip()?;
        let (index, previous_hash) = (tip.index + 1, tip.block_hash.clone());
        let selected_ids: HashSet<String> =
            selected.iter().map(|tx| tx.transaction_id.clone()).collect();

        let block = BlockBuilder::new(index)
            .previous_hash(previous_hash)
            .created_by(creator)
            .add_transactions(selected)?
            .build()?;

        self.add_block(block.clone())?;
        self.pending.retain(|tx| !selected_ids.contains(&tx.transaction_id));

        Ok(Some(block))
    }

    /// Verify, persist, then append. Any failure leaves the ledger unchanged.
    pub fn add_block(&mut self, block: Block) -> Result<()> {
        self.ensure_writable()?;
        if let Err(e) = self.check_candidate(&block) {
            warn!(index = block.index, error = %e, "Rejected block");
            return Err(e);
        }

        self.store.save_block(&block)?;

        info!(
            index = block.index,
            hash = %block.hash_short(),
            transactions = block.transaction_count(),
            "Committed block"
        );
        self.hash_index.insert(block.block_hash.clone(), self.blocks.len());
        self.blocks.push(block);
        Ok(())
    }

    fn check_candidate(&self, block: &Block) -> Result<()> {
        let tip = self.tip()?;

        if !block.verify_integrity() {
            return Err(ChainError::Integrity(format!(
                "Block {} failed its hash check",
                block.index
            )));
        }
        if block.previous_hash != tip.block_hash {
            return Err(ChainError::Linkage(format!(
                "Invalid previous block hash. Expected {}, but got {}.",
                tip.block_hash, block.previous_hash
            )));
        }
        if block.index != tip.index + 1 {
            return Err(ChainError::Linkage(format!(
                "Invalid block index. Expected {}, but got {}.",
                tip.index + 1,
                block.index
            )));
        }

        let mut seen = HashSet::new();
        for tx in &block.transactions {
            Validator::validate_transaction_replay(tx, &self.blocks)?;
            if !seen.insert(tx.transaction_id.as_str()) {
                return Err(ChainError::Replay(format!(
                    "Transaction ID {} appears twice in block {}",
                    tx.transaction_id, block.index
                )));
            }
            if !tx.is_block_eligible() {
                return Err(ChainError::Validation(format!(
                    "Transaction {} is {} with {}/{} approvals and cannot be committed",
                    tx.transaction_id,
                    tx.status,
                    tx.approval_count(),
                    tx.approval_count_required
                )));
            }
            Validator::validate_transaction_with_skew(tx, self.settings.max_clock_skew_ms)?;
        }

        Ok(())
    }

    fn tip(&self) -> Result<&Block> {
        self.blocks
            .last()
            .ok_or_else(|| ChainError::Corruption("Ledger has no genesis block".to_string()))
    }

    // ------------------------------------------------------------------
    // Verification
    // ------------------------------------------------------------------

    pub fn verify_chain(&self) -> bool {
        self.chain_report().is_valid()
    }

    pub fn chain_report(&self) -> ChainReport {
        Validator::validate_chain(&self.blocks)
    }

    pub fn detect_tampering(&self) -> TamperReport {
        Validator::detect_tampering(&self.blocks)
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn latest_block(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn block_by_index(&self, index: u64) -> Option<&Block> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.blocks.get(i))
            .filter(|b| b.index == index)
    }

    pub fn block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.hash_index.get(hash).and_then(|&i| self.blocks.get(i))
    }

    fn committed(&self) -> impl Iterator<Item = &Transaction> {
        self.blocks.iter().flat_map(|b| b.transactions.iter())
    }

    /// Committed transactions first, then the pending pool.
    pub fn transaction_by_hash(&self, hash: &str) -> Option<&Transaction> {
        self.committed()
            .chain(self.pending.iter())
            .find(|tx| tx.transaction_hash == hash)
    }

    pub fn transaction_by_id(&self, transaction_id: &str) -> Option<&Transaction> {
        self.committed()
            .chain(self.pending.iter())
            .find(|tx| tx.transaction_id == transaction_id)
    }

    pub fn transactions_by_wallet(&self, wallet: &str) -> Vec<&Transaction> {
        self.committed().filter(|tx| tx.from_wallet == wallet).collect()
    }

    pub fn transactions_by_module(&self, module: &str) -> Vec<&Transaction> {
        self.committed().filter(|tx| tx.module == module).collect()
    }

    pub fn transactions_by_type(&self, transaction_type: &str) -> Vec<&Transaction> {
        self.committed()
            .filter(|tx| tx.transaction_type == transaction_type)
            .collect()
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of committed blocks, genesis included.
    pub fn height(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn stats(&self) -> ChainStats {
        let latest = self.blocks.last();
        ChainStats {
            total_blocks: self.height(),
            total_transactions: self.committed().count() as u64,
            pending_transactions: self.pending.len() as u64,
            latest_block_index: latest.map_or(0, |b| b.index),
            latest_block_hash: latest.map(|b| b.block_hash.clone()).unwrap_or_default(),
            chain_valid: self.verify_chain(),
            genesis_timestamp: self.blocks.first().map_or(0, |b| b.timestamp),
        }
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    pub fn export_document(&self) -> Result<Value> {
        Ok(json!({
            "version": BLOCK_VERSION,
            "exported_at": crate::now_millis(),
            "stats": serde_json::to_value(self.stats())?,
            "blocks": serde_json::to_value(&self.blocks)?,
        }))
    }

    pub fn export_chain(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let document = serde_json::to_string_pretty(&self.export_document()?)?;
        std::fs::write(path, document)?;
        info!(path = %path.display(), blocks = self.blocks.len(), "Exported chain");
        Ok(())
    }
}

/// A [`Ledger`] behind one read/write lock. Each write method holds the
/// write guard across its whole check-then-act sequence, so two callers can
/// never both commit the same block index.
#[derive(Clone)]
pub struct SharedLedger {
    inner: Arc<RwLock<Ledger>>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        Self { inner: Arc::new(RwLock::new(ledger)) }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Ledger> {
        self.inner.read()
    }

    /// Hold this guard to run several mutations as one critical section.
    pub fn write(&self) -> RwLockWriteGuard<'_, Ledger> {
        self.inner.write()
    }

    pub fn add_transaction(&self, tx: Transaction) -> Result<String> {
        self.inner.write().add_transaction(tx)
    }

    pub fn approve_pending(
        &self,
        transaction_id: &str,
        wallet: &str,
        signature: &str,
        role: &str,
    ) -> Result<Transaction> {
        self.inner
            .write()
            .approve_pending(transaction_id, wallet, signature, role)
            .cloned()
    }

    pub fn reject_pending(
        &self,
        transaction_id: &str,
        wallet: &str,
        signature: &str,
        role: &str,
        reason: &str,
    ) -> Result<Transaction> {
        self.inner
            .write()
            .reject_pending(transaction_id, wallet, signature, role, reason)
            .cloned()
    }

    pub fn create_block(&self, creator: &str, max: Option<usize>) -> Result<Option<Block>> {
        self.inner.write().create_block(creator, max)
    }

    pub fn add_block(&self, block: Block) -> Result<()> {
        self.inner.write().add_block(block)
    }

    pub fn verify_chain(&self) -> bool {
        self.inner.read().verify_chain()
    }

    pub fn stats(&self) -> ChainStats {
        self.inner.read().stats()
    }

    pub fn height(&self) -> u64 {
        self.inner.read().height()
    }
}
