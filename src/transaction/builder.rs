/// Staged construction for transactions
use crate::error::Result;
use crate::hash::HexHash;
use crate::transaction::types::{Transaction, TransactionStatus};
use serde_json::{Map, Value};

/// Collects fields and yields a [`Transaction`] with a finalized hash.
///
/// Nothing is observable until [`build`](Self::build) runs, so a half-built
/// record can never reach the ledger.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    transaction_id: String,
    timestamp: u64,
    nonce: u64,
    transaction_type: String,
    module: String,
    contract_name: String,
    data: Value,
    from_wallet: String,
    signature: String,
    approval_required: bool,
    approval_count_required: u32,
    previous_transaction_hash: Option<HexHash>,
    metadata: Map<String, Value>,
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionBuilder {
    pub fn new() -> Self {
        TransactionBuilder {
            transaction_id: uuid::Uuid::new_v4().to_string(),
            timestamp: crate::now_millis(),
            nonce: 0,
            transaction_type: String::new(),
            module: String::new(),
            contract_name: String::new(),
            data: Value::Object(Map::new()),
            from_wallet: String::new(),
            signature: String::new(),
            approval_required: false,
            approval_count_required: 0,
            previous_transaction_hash: None,
            metadata: Map::new(),
        }
    }

    pub fn transaction_type(mut self, transaction_type: impl Into<String>) -> Self {
        self.transaction_type = transaction_type.into();
        self
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    pub fn contract(mut self, contract_name: impl Into<String>) -> Self {
        self.contract_name = contract_name.into();
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn wallet(mut self, wallet: impl Into<String>) -> Self {
        self.from_wallet = wallet.into();
        self
    }

    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    pub fn approval_requirements(mut self, required: bool, count: u32) -> Self {
        self.approval_required = required;
        self.approval_count_required = count;
        self
    }

    pub fn previous_hash(mut self, previous_hash: impl Into<HexHash>) -> Self {
        self.previous_transaction_hash = Some(previous_hash.into());
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Override the creation time (unix millis). Mostly useful for fixtures.
    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Override the generated id.
    pub fn transaction_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = id.into();
        self
    }

    pub fn build(self) -> Result<Transaction> {
        let mut tx = Transaction {
            transaction_id: self.transaction_id,
            timestamp: self.timestamp,
            nonce: self.nonce,
            transaction_type: self.transaction_type,
            module: self.module,
            contract_name: self.contract_name,
            data: self.data,
            from_wallet: self.from_wallet,
            signature: self.signature,
            approvals: Vec::new(),
            rejection: None,
            approval_required: self.approval_required,
            approval_count_required: self.approval_count_required,
            status: TransactionStatus::Pending,
            previous_transaction_hash: self.previous_transaction_hash,
            metadata: self.metadata,
            transaction_hash: String::new(),
        };
        tx.recalculate_hash()?;
        Ok(tx)
    }
}
