/// Transaction record and its approval state machine
use crate::error::{ChainError, Result};
use crate::hash::{hash_canonical, HexHash};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Rejected => "rejected",
            TransactionStatus::Executed => "executed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Rejected | TransactionStatus::Executed)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One approver's signature over a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub wallet: String,
    pub signature: String,
    pub role: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub wallet: String,
    pub signature: String,
    pub role: String,
    pub reason: String,
    pub timestamp: u64,
}

/// A recorded ledger action.
///
/// Construct through [`TransactionBuilder`](super::TransactionBuilder); the
/// content hash is only valid once the builder has finalized it. After
/// inclusion in a block the record is never mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub timestamp: u64,
    pub nonce: u64,
    pub transaction_type: String,
    pub module: String,
    pub contract_name: String,
    pub data: Value,
    pub from_wallet: String,
    pub signature: String,
    pub approvals: Vec<Approval>,
    #[serde(default)]
    pub rejection: Option<Rejection>,
    pub approval_required: bool,
    pub approval_count_required: u32,
    pub status: TransactionStatus,
    pub previous_transaction_hash: Option<HexHash>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub transaction_hash: HexHash,
}

/// Every field except the hash itself, in the shape that gets hashed.
#[derive(Serialize)]
struct HashedFields<'a> {
    transaction_id: &'a str,
    timestamp: u64,
    nonce: u64,
    transaction_type: &'a str,
    module: &'a str,
    contract_name: &'a str,
    data: &'a Value,
    from_wallet: &'a str,
    signature: &'a str,
    approvals: &'a [Approval],
    rejection: &'a Option<Rejection>,
    approval_required: bool,
    approval_count_required: u32,
    status: TransactionStatus,
    previous_transaction_hash: &'a Option<HexHash>,
    metadata: &'a Map<String, Value>,
}

impl Transaction {
    /// Canonical SHA-256 over every field but `transaction_hash`.
    pub fn calculate_hash(&self) -> Result<HexHash> {
        hash_canonical(&HashedFields {
            transaction_id: &self.transaction_id,
            timestamp: self.timestamp,
            nonce: self.nonce,
            transaction_type: &self.transaction_type,
            module: &self.module,
            contract_name: &self.contract_name,
            data: &self.data,
            from_wallet: &self.from_wallet,
            signature: &self.signature,
            approvals: &self.approvals,
            rejection: &self.rejection,
            approval_required: self.approval_required,
            approval_count_required: self.approval_count_required,
            status: self.status,
            previous_transaction_hash: &self.previous_transaction_hash,
            metadata: &self.metadata,
        })
    }

    pub fn recalculate_hash(&mut self) -> Result<&str> {
        self.transaction_hash = self.calculate_hash()?;
        Ok(&self.transaction_hash)
    }

    pub fn verify_integrity(&self) -> bool {
        matches!(self.calculate_hash(), Ok(expected) if expected == self.transaction_hash)
    }

    /// Record an approval. Signature and role eligibility must already have
    /// been checked by the caller; this only guards the state machine.
    pub fn add_approval(&mut self, wallet: &str, signature: &str, role: &str) -> Result<()> {
        if self.status.is_terminal() {
            return Err(ChainError::Validation(format!(
                "Transaction {} is {} and cannot be approved",
                self.transaction_id, self.status
            )));
        }
        if wallet.is_empty() || signature.is_empty() || role.is_empty() {
            return Err(ChainError::Validation(
                "Approval requires wallet, signature and role".to_string(),
            ));
        }
        if self.approvals.iter().any(|a| a.wallet == wallet) {
            return Err(ChainError::Validation(format!(
                "Duplicate approver {} for transaction {}",
                wallet, self.transaction_id
            )));
        }
        if self.approval_required && self.is_fully_approved() {
            return Err(ChainError::Validation(format!(
                "Transaction {} already has {}/{} approvals",
                self.transaction_id,
                self.approvals.len(),
                self.approval_count_required
            )));
        }

        let mut updated = self.clone();
        updated.approvals.push(Approval {
            wallet: wallet.to_string(),
            signature: signature.to_string(),
            role: role.to_string(),
            timestamp: crate::now_millis(),
        });
        if updated.approvals.len() as u64 >= u64::from(updated.approval_count_required)
            && updated.status == TransactionStatus::Pending
        {
            updated.status = TransactionStatus::Approved;
        }
        updated.recalculate_hash()?;

        *self = updated;
        Ok(())
    }

    pub fn reject(&mut self, wallet: &str, signature: &str, role: &str, reason: &str) -> Result<()> {
        if self.status != TransactionStatus::Pending {
            return Err(ChainError::Validation(format!(
                "Only pending transactions can be rejected; {} is {}",
                self.transaction_id, self.status
            )));
        }
        if wallet.is_empty() || signature.is_empty() {
            return Err(ChainError::Validation(
                "Rejection requires wallet and signature".to_string(),
            ));
        }

        let mut updated = self.clone();
        updated.rejection = Some(Rejection {
            wallet: wallet.to_string(),
            signature: signature.to_string(),
            role: role.to_string(),
            reason: reason.to_string(),
            timestamp: crate::now_millis(),
        });
        updated.status = TransactionStatus::Rejected;
        updated.recalculate_hash()?;

        *self = updated;
        Ok(())
    }

    /// Mark as applied by the owning domain. Terminal.
    pub fn mark_executed(&mut self) -> Result<()> {
        if self.status.is_terminal() || !self.is_fully_approved() {
            return Err(ChainError::Validation(format!(
                "Transaction {} cannot be executed while {} with {}/{} approvals",
                self.transaction_id,
                self.status,
                self.approvals.len(),
                self.approval_count_required
            )));
        }

        let mut updated = self.clone();
        updated.status = TransactionStatus::Executed;
        updated.recalculate_hash()?;

        *self = updated;
        Ok(())
    }

    pub fn is_fully_approved(&self) -> bool {
        if !self.approval_required {
            return true;
        }
        self.approvals.len() as u64 >= u64::from(self.approval_count_required)
    }

    /// Whether block creation may pick this transaction up. An approved or
    /// executed status only counts when the approvals back it.
    pub fn is_block_eligible(&self) -> bool {
        match self.status {
            TransactionStatus::Rejected => false,
            TransactionStatus::Approved | TransactionStatus::Executed => self.is_fully_approved(),
            TransactionStatus::Pending => !self.approval_required,
        }
    }

    pub fn approval_count(&self) -> usize {
        self.approvals.len()
    }

    pub fn hash_short(&self) -> &str {
        let end = self.transaction_hash.len().min(12);
        &self.transaction_hash[..end]
    }
}
