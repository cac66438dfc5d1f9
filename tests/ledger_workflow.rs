//! Integration tests for the submit / approve / seal workflow

use auditledger::blockchain::{Ledger, SharedLedger, Validator, GENESIS_PREVIOUS_HASH};
use auditledger::error::ChainError;
use auditledger::merkle::MerkleTree;
use auditledger::policy::{prepare_transaction, ContractRegistry};
use auditledger::rbac::RoleManager;
use auditledger::transaction::{Transaction, TransactionBuilder, TransactionStatus};
use serde_json::{json, Value};
use std::thread;

const CLERK: &str = "0x1111111111111111111111111111111111111111";
const CFO: &str = "0x2222222222222222222222222222222222222222";
const CHIEF_ACCOUNTANT: &str = "0x3333333333333333333333333333333333333333";
const CEO: &str = "0x4444444444444444444444444444444444444444";

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn journal_entry(amount: f64) -> Value {
    json!({
        "entry_date": "2024-06-30",
        "description": "Vendor invoice",
        "debits": [{"account_code": "5000", "amount": amount}],
        "credits": [{"account_code": "2000", "amount": amount}],
    })
}

fn simple_tx(label: &str) -> Result<Transaction, ChainError> {
    TransactionBuilder::new()
        .transaction_type("sale_recorded")
        .module("sales")
        .contract("sales_invoice_contract")
        .data(json!({"invoice": label}))
        .wallet(CLERK)
        .signature("clerk-signature")
        .build()
}

#[test]
fn test_fresh_chain() -> TestResult {
    let ledger = Ledger::in_memory()?;

    assert_eq!(ledger.height(), 1);
    let genesis = ledger.latest_block().ok_or("missing genesis")?;
    assert_eq!(genesis.index, 0);
    assert_eq!(genesis.previous_hash, GENESIS_PREVIOUS_HASH);
    assert_eq!(genesis.transaction_count(), 1);
    assert!(ledger.verify_chain());
    Ok(())
}

#[test]
fn test_create_block_from_three_transactions() -> TestResult {
    let mut ledger = Ledger::in_memory()?;
    let mut hashes = Vec::new();
    for label in ["INV-1", "INV-2", "INV-3"] {
        hashes.push(ledger.add_transaction(simple_tx(label)?)?);
    }

    let block = ledger.create_block(CEO, None)?.ok_or("no block created")?;
    let genesis_hash = ledger.blocks()[0].block_hash.clone();

    assert_eq!(block.index, 1);
    assert_eq!(block.previous_hash, genesis_hash);
    assert_eq!(block.transaction_hashes(), hashes);
    assert_eq!(block.merkle_root, MerkleTree::new(hashes.clone()).root_hash().map(str::to_string));
    assert!(ledger.pending_transactions().is_empty());
    assert!(ledger.verify_chain());

    for hash in &hashes {
        assert!(block.verify_transaction_inclusion(hash));
        let proof = block.get_proof(hash).ok_or("no proof")?;
        let root = block.merkle_root.as_deref().ok_or("no root")?;
        assert!(MerkleTree::verify_proof(hash, &proof, root));
    }
    Ok(())
}

#[test]
fn test_two_of_n_approvals() -> TestResult {
    let mut ledger = Ledger::in_memory()?;
    let tx = TransactionBuilder::new()
        .transaction_type("journal_entry")
        .module("accounting")
        .contract("accounting_entry_contract")
        .data(json!({"amount": 75_000}))
        .wallet(CLERK)
        .signature("clerk-signature")
        .approval_requirements(true, 2)
        .build()?;
    let id = tx.transaction_id.clone();
    ledger.add_transaction(tx)?;

    let first = ledger.approve_pending(&id, CFO, "cfo-signature", "CFO")?;
    assert_eq!(first.status, TransactionStatus::Pending);
    let first_hash = first.transaction_hash.clone();
    assert!(ledger.create_block(CEO, None)?.is_none());

    let again = ledger.approve_pending(&id, CFO, "cfo-signature", "CFO");
    assert!(matches!(again, Err(ChainError::Validation(ref msg)) if msg.contains("Duplicate approver")));
    let unchanged = ledger.transaction_by_id(&id).ok_or("lost transaction")?;
    assert_eq!(unchanged.approval_count(), 1);
    assert_eq!(unchanged.transaction_hash, first_hash);

    let second = ledger.approve_pending(&id, CEO, "ceo-signature", "CEO")?;
    assert_eq!(second.status, TransactionStatus::Approved);

    let block = ledger.create_block(CEO, None)?.ok_or("approved transaction not sealed")?;
    assert_eq!(block.transactions[0].transaction_id, id);
    Validator::validate_approval_chain(&block.transactions[0])?;
    Ok(())
}

#[test]
fn test_policy_and_roles_drive_approval() -> TestResult {
    let registry = ContractRegistry::with_defaults();
    let mut roles = RoleManager::new();
    roles.assign_role(CFO, "CFO")?;
    roles.assign_role(CHIEF_ACCOUNTANT, "Chief Accountant")?;
    roles.assign_role(CLERK, "Data Entry")?;

    let (tx, policy) = prepare_transaction(
        &registry,
        "accounting_entry_contract",
        "journal_entry",
        "accounting",
        &journal_entry(60_000.0),
        CLERK,
        "clerk-signature",
    )?;
    assert_eq!(policy.required_approvals, 2);

    let mut ledger = Ledger::in_memory()?;
    let id = tx.transaction_id.clone();
    ledger.add_transaction(tx)?;

    assert!(roles
        .authorize_approval(CLERK, "Data Entry", "accounting", &policy.allowed_roles)
        .is_err());

    for (wallet, role) in [(CFO, "CFO"), (CHIEF_ACCOUNTANT, "Chief Accountant")] {
        roles.authorize_approval(wallet, role, "accounting", &policy.allowed_roles)?;
        ledger.approve_pending(&id, wallet, &format!("{}-sig", role), role)?;
    }

    let block = ledger.create_block(CEO, None)?.ok_or("not sealed")?;
    let committed = &block.transactions[0];
    assert_eq!(committed.status, TransactionStatus::Approved);
    assert_eq!(committed.data["balanced"], true);
    assert_eq!(ledger.transactions_by_module("accounting").len(), 1);
    Ok(())
}

#[test]
fn test_hire_needs_hr_sign_off() -> TestResult {
    const HR_MANAGER: &str = "0x5555555555555555555555555555555555555555";
    let registry = ContractRegistry::with_defaults();
    let mut roles = RoleManager::new();
    roles.assign_role(HR_MANAGER, "HR Manager")?;
    roles.assign_role(CFO, "CFO")?;

    let hire = json!({
        "operation": "hire",
        "employee_id": "E-100",
        "employee_name": "Alex Kim",
        "position": "Payroll Specialist",
        "department": "Finance",
        "start_date": "2024-09-01",
        "salary": 48_000,
    });
    let (tx, policy) =
        prepare_transaction(&registry, "employee_contract", "employee_hired", "hr", &hire, CLERK, "clerk-signature")?;
    assert_eq!(policy.required_approvals, 1);

    let mut ledger = Ledger::in_memory()?;
    let id = tx.transaction_id.clone();
    ledger.add_transaction(tx)?;
    assert!(ledger.create_block(CEO, None)?.is_none());

    assert!(roles.authorize_approval(CFO, "CFO", "hr", &policy.allowed_roles).is_err());
    roles.authorize_approval(HR_MANAGER, "HR Manager", "hr", &policy.allowed_roles)?;
    ledger.approve_pending(&id, HR_MANAGER, "hr-signature", "HR Manager")?;

    let block = ledger.create_block(CEO, None)?.ok_or("hire not sealed")?;
    assert_eq!(block.transactions[0].data["details"]["position"], "Payroll Specialist");
    assert_eq!(ledger.transactions_by_module("hr").len(), 1);
    Ok(())
}

#[test]
fn test_rejected_entry_never_reaches_a_block() -> TestResult {
    let mut ledger = Ledger::in_memory()?;
    let tx = TransactionBuilder::new()
        .transaction_type("journal_entry")
        .module("accounting")
        .wallet(CLERK)
        .signature("clerk-signature")
        .approval_requirements(true, 1)
        .build()?;
    let id = tx.transaction_id.clone();
    ledger.add_transaction(tx)?;
    ledger.add_transaction(simple_tx("INV-9")?)?;

    ledger.reject_pending(&id, CFO, "cfo-signature", "CFO", "Missing receipt")?;
    let block = ledger.create_block(CEO, None)?.ok_or("eligible tx not sealed")?;
    assert_eq!(block.transaction_count(), 1);
    assert_ne!(block.transactions[0].transaction_id, id);

    assert_eq!(ledger.pending_transactions().len(), 1);
    let rejected = ledger.discard_rejected();
    assert_eq!(rejected[0].rejection.as_ref().map(|r| r.reason.as_str()), Some("Missing receipt"));
    Ok(())
}

#[test]
fn test_concurrent_writers_share_one_chain() -> TestResult {
    let shared = SharedLedger::new(Ledger::in_memory()?);

    let workers: Vec<_> = (0..6)
        .map(|n| {
            let ledger = shared.clone();
            thread::spawn(move || -> Result<(), ChainError> {
                for i in 0..5 {
                    ledger.add_transaction(simple_tx(&format!("T{}-{}", n, i))?)?;
                    ledger.create_block(CEO, Some(3))?;
                }
                Ok(())
            })
        })
        .collect();
    for worker in workers {
        worker.join().map_err(|_| "worker panicked")??;
    }

    while shared.create_block(CEO, None)?.is_some() {}

    let ledger = shared.read();
    assert!(ledger.verify_chain());
    assert_eq!(ledger.stats().total_transactions, 31);
    for (i, block) in ledger.blocks().iter().enumerate() {
        assert_eq!(block.index, i as u64);
    }
    Ok(())
}
