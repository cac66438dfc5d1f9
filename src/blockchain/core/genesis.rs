//! Genesis block construction.

use super::block::{Block, BlockBuilder, BLOCK_VERSION, GENESIS_PREVIOUS_HASH};
use crate::error::Result;
use crate::rbac::RoleManager;
use crate::transaction::{Transaction, TransactionBuilder};
use serde_json::{json, Map, Value};

pub const SYSTEM_WALLET: &str = "0x0000000000000000000000000000000000000000";
pub const GENESIS_CREATOR: &str = "SYSTEM";
pub const SUPPORTED_MODULES: [&str; 5] = ["accounting", "hr", "sales", "procurement", "audit"];

fn default_metadata() -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("system_name".into(), json!("AuditLedger"));
    metadata.insert("version".into(), json!(BLOCK_VERSION));
    metadata.insert("created_at".into(), json!(crate::now_millis()));
    metadata.insert(
        "description".into(),
        json!("Genesis Block - immutable accounting ledger"),
    );
    metadata.insert("supported_modules".into(), json!(SUPPORTED_MODULES));
    metadata
}

fn system_transaction(transaction_type: &str, contract: &str, signature: &str, data: Value) -> Result<Transaction> {
    TransactionBuilder::new()
        .transaction_type(transaction_type)
        .module("system")
        .contract(contract)
        .data(data)
        .wallet(SYSTEM_WALLET)
        .signature(signature)
        .build()
}

/// Index 0, previous hash `"0"`, one ungated initialization transaction.
/// `extra` is merged over the default metadata.
pub fn create_genesis_block(extra: Map<String, Value>) -> Result<Block> {
    let mut metadata = default_metadata();
    metadata.extend(extra);

    let init = system_transaction(
        "system_initialization",
        "genesis_contract",
        "GENESIS_SIGNATURE",
        json!({
            "action": "initialize_ledger",
            "system_version": BLOCK_VERSION,
        }),
    )?;

    BlockBuilder::new(0)
        .previous_hash(GENESIS_PREVIOUS_HASH)
        .created_by(GENESIS_CREATOR)
        .add_transaction(init)?
        .metadata(metadata)
        .build()
}

pub fn create_system_configuration_transaction(config: Value) -> Result<Transaction> {
    system_transaction("system_configuration", "config_contract", "SYSTEM_CONFIG_SIGNATURE", config)
}

/// Snapshot of the role table as a ledger record.
pub fn create_initial_roles_transaction(roles: &RoleManager) -> Result<Transaction> {
    let data = serde_json::to_value(roles.roles_document())?;
    system_transaction("roles_initialization", "roles_contract", "ROLES_INIT_SIGNATURE", data)
}

/// Genesis plus system configuration and the initial role table.
pub fn create_enriched_genesis_block(roles: &RoleManager, max_block_size: usize) -> Result<Block> {
    let mut extra = Map::new();
    extra.insert("ledger_type".into(), json!("private_permissioned"));
    extra.insert("approval_model".into(), json!("multi_signature"));
    extra.insert("hash_algorithm".into(), json!("SHA-256"));

    let mut genesis = create_genesis_block(extra)?;
    genesis.add_transaction(create_system_configuration_transaction(json!({
        "max_block_size": max_block_size,
        "hash_algorithm": "SHA-256",
    }))?)?;
    genesis.add_transaction(create_initial_roles_transaction(roles)?)?;
    Ok(genesis)
}
