//! Contract policies: payload validation, normalisation and approval requirements.
//!
//! The ledger never calls into this module. A caller runs the payload
//! through [`prepare_transaction`] and submits the resulting transaction.

use crate::error::{ChainError, Result};
use crate::transaction::{Transaction, TransactionBuilder};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::info;

/// Business rules for one contract type.
pub trait ContractPolicy: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str;

    /// `Err` carries a message suitable for the submitter.
    fn validate(&self, data: &Value) -> std::result::Result<(), String>;

    /// Normalised payload stored inside the transaction. Only called on
    /// validated data.
    fn execute(&self, data: &Value) -> Value;

    fn required_approvals(&self, data: &Value) -> u32;

    fn required_roles(&self, data: &Value) -> Vec<String>;
}

/// Approval outcome a policy hands to the approval state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    pub required_approvals: u32,
    pub allowed_roles: Vec<String>,
}

impl ApprovalPolicy {
    pub fn requires_approval(&self) -> bool {
        self.required_approvals > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub active: bool,
    pub deprecated: bool,
}

/// Contracts keyed by name, then version. The first version registered
/// under a name becomes active.
#[derive(Default)]
pub struct ContractRegistry {
    contracts: BTreeMap<String, BTreeMap<String, Box<dyn ContractPolicy>>>,
    active: HashMap<String, String>,
    deprecated: HashSet<(String, String)>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in contracts.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let builtins: [Box<dyn ContractPolicy>; 4] = [
            Box::new(JournalEntryContract),
            Box::new(EmployeeContract),
            Box::new(SalesInvoiceContract),
            Box::new(PurchaseOrderContract),
        ];
        for contract in builtins {
            registry.register(contract).ok();
        }
        registry
    }

    pub fn register(&mut self, contract: Box<dyn ContractPolicy>) -> Result<()> {
        let name = contract.name().to_string();
        let version = contract.version().to_string();

        let versions = self.contracts.entry(name.clone()).or_default();
        if versions.contains_key(&version) {
            return Err(ChainError::Validation(format!(
                "Contract {} v{} is already registered",
                name, version
            )));
        }
        versions.insert(version.clone(), contract);
        self.active.entry(name.clone()).or_insert_with(|| version.clone());

        info!(contract = %name, %version, "Registered contract");
        Ok(())
    }

    /// The active version when `version` is `None`.
    pub fn get(&self, name: &str, version: Option<&str>) -> Option<&dyn ContractPolicy> {
        let version = match version {
            Some(v) => v,
            None => self.active.get(name)?.as_str(),
        };
        self.contracts
            .get(name)?
            .get(version)
            .map(|contract| contract.as_ref())
    }

    /// Active, non-deprecated version, ready to process payloads.
    pub fn active(&self, name: &str) -> Result<&dyn ContractPolicy> {
        let contract = self
            .get(name, None)
            .ok_or_else(|| ChainError::NotFound(format!("Contract '{}' not found", name)))?;
        if self.is_deprecated(name, contract.version()) {
            return Err(ChainError::Validation(format!(
                "Contract '{}' is not active",
                name
            )));
        }
        Ok(contract)
    }

    pub fn set_active_version(&mut self, name: &str, version: &str) -> Result<()> {
        if self.get(name, Some(version)).is_none() {
            return Err(ChainError::NotFound(format!(
                "Contract {} v{} not found",
                name, version
            )));
        }
        if self.is_deprecated(name, version) {
            return Err(ChainError::Validation(format!(
                "Contract {} v{} is deprecated",
                name, version
            )));
        }
        self.active.insert(name.to_string(), version.to_string());
        Ok(())
    }

    pub fn deprecate(&mut self, name: &str, version: &str) -> Result<()> {
        if self.get(name, Some(version)).is_none() {
            return Err(ChainError::NotFound(format!(
                "Contract {} v{} not found",
                name, version
            )));
        }
        self.deprecated.insert((name.to_string(), version.to_string()));
        Ok(())
    }

    pub fn is_deprecated(&self, name: &str, version: &str) -> bool {
        self.deprecated.contains(&(name.to_string(), version.to_string()))
    }

    pub fn versions(&self, name: &str) -> Vec<String> {
        self.contracts
            .get(name)
            .map(|versions| versions.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn list(&self) -> Vec<ContractInfo> {
        self.contracts
            .iter()
            .flat_map(|(name, versions)| {
                versions.iter().map(move |(version, contract)| ContractInfo {
                    name: name.clone(),
                    version: version.clone(),
                    description: contract.description().to_string(),
                    active: self.active.get(name) == Some(version),
                    deprecated: self.is_deprecated(name, version),
                })
            })
            .collect()
    }
}

/// Validate `data` with the named contract and build the transaction that
/// records it, gated by the contract's approval requirement.
pub fn prepare_transaction(
    registry: &ContractRegistry,
    contract_name: &str,
    transaction_type: &str,
    module: &str,
    data: &Value,
    wallet: &str,
    signature: &str,
) -> Result<(Transaction, ApprovalPolicy)> {
    let contract = registry.active(contract_name)?;
    contract.validate(data).map_err(ChainError::Validation)?;

    let policy = ApprovalPolicy {
        required_approvals: contract.required_approvals(data),
        allowed_roles: contract.required_roles(data),
    };

    let mut metadata = Map::new();
    metadata.insert("contract_version".into(), json!(contract.version()));
    if !policy.allowed_roles.is_empty() {
        metadata.insert("allowed_roles".into(), json!(policy.allowed_roles));
    }

    let tx = TransactionBuilder::new()
        .transaction_type(transaction_type)
        .module(module)
        .contract(contract.name())
        .data(contract.execute(data))
        .wallet(wallet)
        .signature(signature)
        .approval_requirements(policy.requires_approval(), policy.required_approvals)
        .metadata(metadata)
        .build()?;

    Ok((tx, policy))
}

// ============================================================================
// Journal entries
// ============================================================================

/// Double-entry journal entries. Approval tiers follow the total debit amount.
pub struct JournalEntryContract;

const BALANCE_TOLERANCE: f64 = 0.01;

fn line_total(lines: Option<&Value>) -> f64 {
    lines
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(|line| line.get("amount").and_then(Value::as_f64))
                .sum()
        })
        .unwrap_or(0.0)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn validate_line(line: &Value, kind: &str, index: usize) -> std::result::Result<(), String> {
    let label = format!("{} line {}", capitalize(kind), index + 1);

    match line.get("account_code").and_then(Value::as_str) {
        Some(code) if !code.is_empty() => {}
        Some(_) => return Err(format!("{}: Invalid account code", label)),
        None => return Err(format!("{}: Missing required field: account_code", label)),
    }

    let amount = match line.get("amount") {
        None => return Err(format!("{}: Missing required field: amount", label)),
        Some(value) => value
            .as_f64()
            .ok_or_else(|| format!("{}: Amount must be a number", label))?,
    };
    if amount < 0.0 {
        return Err(format!("{}: Amount cannot be negative", label));
    }
    if amount == 0.0 {
        return Err(format!("{}: Amount cannot be zero", label));
    }
    Ok(())
}

impl JournalEntryContract {
    fn total_debits(data: &Value) -> f64 {
        line_total(data.get("debits"))
    }
}

impl ContractPolicy for JournalEntryContract {
    fn name(&self) -> &str {
        "accounting_entry_contract"
    }

    fn description(&self) -> &str {
        "Accounting journal entries with double-entry validation"
    }

    fn validate(&self, data: &Value) -> std::result::Result<(), String> {
        for field in ["entry_date", "description", "debits", "credits"] {
            if data.get(field).map_or(true, Value::is_null) {
                return Err(format!("Missing required field: {}", field));
            }
        }

        let date = data["entry_date"].as_str().unwrap_or_default();
        if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
            return Err(format!("Invalid date format '{}', expected YYYY-MM-DD", date));
        }

        let (Some(debits), Some(credits)) = (data["debits"].as_array(), data["credits"].as_array()) else {
            return Err("Debits and credits must be lists".to_string());
        };
        if debits.is_empty() || credits.is_empty() {
            return Err("At least one debit and one credit entry required".to_string());
        }

        for (i, line) in debits.iter().enumerate() {
            validate_line(line, "debit", i)?;
        }
        for (i, line) in credits.iter().enumerate() {
            validate_line(line, "credit", i)?;
        }

        let total_debits = line_total(data.get("debits"));
        let total_credits = line_total(data.get("credits"));
        if (total_debits - total_credits).abs() > BALANCE_TOLERANCE {
            return Err(format!(
                "Debits ({}) must equal credits ({})",
                total_debits, total_credits
            ));
        }

        Ok(())
    }

    fn execute(&self, data: &Value) -> Value {
        let total_debits = Self::total_debits(data);
        let total_credits = line_total(data.get("credits"));
        json!({
            "entry_type": "journal_entry",
            "entry_date": data["entry_date"],
            "description": data["description"],
            "debits": data["debits"],
            "credits": data["credits"],
            "total_amount": total_debits,
            "balanced": (total_debits - total_credits).abs() < BALANCE_TOLERANCE,
            "reference": data.get("reference").cloned().unwrap_or_else(|| json!("")),
            "metadata": data.get("metadata").cloned().unwrap_or_else(|| json!({})),
        })
    }

    fn required_approvals(&self, data: &Value) -> u32 {
        let total = Self::total_debits(data);
        if total > 100_000.0 {
            3
        } else if total > 50_000.0 {
            2
        } else if total > 10_000.0 {
            1
        } else {
            0
        }
    }

    fn required_roles(&self, data: &Value) -> Vec<String> {
        let total = Self::total_debits(data);
        let roles: &[&str] = if total > 100_000.0 {
            &["CEO", "CFO", "Chief Accountant"]
        } else if total > 50_000.0 {
            &["CFO", "Chief Accountant"]
        } else if total > 10_000.0 {
            &["Chief Accountant"]
        } else {
            &[]
        };
        roles.iter().map(|r| r.to_string()).collect()
    }
}

// ============================================================================
// Shared payload checks
// ============================================================================

fn require_fields(data: &Value, fields: &[&str]) -> std::result::Result<(), String> {
    let missing: Vec<&str> = fields
        .iter()
        .copied()
        .filter(|field| data.get(*field).map_or(true, Value::is_null))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("Missing required fields: {}", missing.join(", ")))
    }
}

fn parse_date(value: &Value) -> std::result::Result<NaiveDate, String> {
    value
        .as_str()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .ok_or_else(|| "Invalid date format, expected YYYY-MM-DD".to_string())
}

fn check_amount(value: &Value) -> std::result::Result<f64, String> {
    let amount = value.as_f64().ok_or_else(|| "Amount must be a number".to_string())?;
    if amount < 0.0 {
        return Err("Amount cannot be negative".to_string());
    }
    Ok(amount)
}

/// Line items carrying `description`, `quantity` and `unit_price`.
fn validate_items(data: &Value) -> std::result::Result<(), String> {
    let items = match data.get("items").and_then(Value::as_array) {
        Some(items) if !items.is_empty() => items,
        _ => return Err("At least one item is required".to_string()),
    };
    for (i, item) in items.iter().enumerate() {
        require_fields(item, &["description", "quantity", "unit_price"])
            .map_err(|e| format!("Item {}: {}", i + 1, e))?;
        match item["quantity"].as_f64() {
            Some(quantity) if quantity > 0.0 => {}
            _ => return Err(format!("Item {}: Quantity must be greater than zero", i + 1)),
        }
        check_amount(&item["unit_price"]).map_err(|e| format!("Item {}: Unit price - {}", i + 1, e))?;
    }
    Ok(())
}

fn item_total(item: &Value) -> f64 {
    item["quantity"].as_f64().unwrap_or(0.0) * item["unit_price"].as_f64().unwrap_or(0.0)
}

fn items_subtotal(data: &Value) -> f64 {
    data.get("items")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(item_total).sum())
        .unwrap_or(0.0)
}

/// Items with their line totals filled in.
fn priced_items(data: &Value) -> Value {
    let items = data["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    let mut priced = item.clone();
                    priced["total"] = json!(item_total(item));
                    priced
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    Value::Array(items)
}

fn roles(names: &[&str]) -> Vec<String> {
    names.iter().map(|r| r.to_string()).collect()
}

const DEFAULT_TAX_RATE: f64 = 0.15;

// ============================================================================
// HR
// ============================================================================

/// Hire, terminate, update and transfer operations on employee records.
pub struct EmployeeContract;

const EMPLOYEE_OPERATIONS: [&str; 4] = ["hire", "terminate", "update", "transfer"];

impl EmployeeContract {
    fn needs_approval(data: &Value) -> bool {
        match data.get("operation").and_then(Value::as_str) {
            Some("hire" | "terminate" | "transfer") => true,
            Some("update") => data.get("salary").is_some(),
            _ => false,
        }
    }
}

impl ContractPolicy for EmployeeContract {
    fn name(&self) -> &str {
        "employee_contract"
    }

    fn description(&self) -> &str {
        "Employee management operations"
    }

    fn validate(&self, data: &Value) -> std::result::Result<(), String> {
        require_fields(data, &["operation", "employee_id"])?;

        match data["operation"].as_str().unwrap_or_default() {
            "hire" => {
                require_fields(data, &["employee_name", "position", "department", "start_date", "salary"])?;
                parse_date(&data["start_date"])?;
                check_amount(&data["salary"])?;
            }
            "terminate" => {
                require_fields(data, &["termination_date", "reason"])?;
                parse_date(&data["termination_date"])?;
            }
            "update" => {
                if let Some(salary) = data.get("salary") {
                    check_amount(salary)?;
                }
            }
            "transfer" => {
                require_fields(data, &["new_department", "transfer_date"])?;
                parse_date(&data["transfer_date"])?;
            }
            _ => {
                return Err(format!(
                    "Invalid operation. Must be one of: {}",
                    EMPLOYEE_OPERATIONS.join(", ")
                ))
            }
        }
        Ok(())
    }

    fn execute(&self, data: &Value) -> Value {
        let details: Map<String, Value> = data
            .as_object()
            .map(|fields| {
                fields
                    .iter()
                    .filter(|(key, _)| !matches!(key.as_str(), "operation" | "employee_id"))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        json!({
            "operation": data["operation"],
            "employee_id": data["employee_id"],
            "details": details,
            "metadata": data.get("metadata").cloned().unwrap_or_else(|| json!({})),
        })
    }

    fn required_approvals(&self, data: &Value) -> u32 {
        u32::from(Self::needs_approval(data))
    }

    fn required_roles(&self, data: &Value) -> Vec<String> {
        if Self::needs_approval(data) {
            roles(&["HR Manager", "CEO"])
        } else {
            Vec::new()
        }
    }
}

// ============================================================================
// Sales
// ============================================================================

/// Sales invoices. Large invoices need a sales manager's sign-off.
pub struct SalesInvoiceContract;

impl ContractPolicy for SalesInvoiceContract {
    fn name(&self) -> &str {
        "sales_invoice_contract"
    }

    fn description(&self) -> &str {
        "Sales invoice processing"
    }

    fn validate(&self, data: &Value) -> std::result::Result<(), String> {
        require_fields(data, &["invoice_date", "customer_id", "items"])?;
        parse_date(&data["invoice_date"])?;
        validate_items(data)
    }

    fn execute(&self, data: &Value) -> Value {
        let subtotal = items_subtotal(data);
        let tax_rate = data.get("tax_rate").and_then(Value::as_f64).unwrap_or(DEFAULT_TAX_RATE);
        let tax_amount = subtotal * tax_rate;
        let discount = data.get("discount").and_then(Value::as_f64).unwrap_or(0.0);
        json!({
            "invoice_date": data["invoice_date"],
            "customer_id": data["customer_id"],
            "items": priced_items(data),
            "subtotal": subtotal,
            "tax_rate": tax_rate,
            "tax_amount": tax_amount,
            "discount": discount,
            "total": subtotal + tax_amount - discount,
            "payment_terms": data.get("payment_terms").cloned().unwrap_or_else(|| json!("Net 30")),
            "metadata": data.get("metadata").cloned().unwrap_or_else(|| json!({})),
        })
    }

    fn required_approvals(&self, data: &Value) -> u32 {
        u32::from(items_subtotal(data) > 50_000.0)
    }

    fn required_roles(&self, data: &Value) -> Vec<String> {
        if items_subtotal(data) > 50_000.0 {
            roles(&["Sales Manager", "CEO"])
        } else {
            Vec::new()
        }
    }
}

// ============================================================================
// Procurement
// ============================================================================

/// Purchase orders, tiered on the order subtotal.
pub struct PurchaseOrderContract;

impl ContractPolicy for PurchaseOrderContract {
    fn name(&self) -> &str {
        "purchase_order_contract"
    }

    fn description(&self) -> &str {
        "Purchase order processing"
    }

    fn validate(&self, data: &Value) -> std::result::Result<(), String> {
        require_fields(data, &["po_date", "vendor_id", "items", "delivery_date"])?;
        let ordered = parse_date(&data["po_date"])?;
        let delivery = parse_date(&data["delivery_date"])?;
        if delivery < ordered {
            return Err("Delivery date cannot be before purchase order date".to_string());
        }
        validate_items(data)
    }

    fn execute(&self, data: &Value) -> Value {
        let subtotal = items_subtotal(data);
        let tax_rate = data.get("tax_rate").and_then(Value::as_f64).unwrap_or(DEFAULT_TAX_RATE);
        let tax_amount = subtotal * tax_rate;
        json!({
            "po_date": data["po_date"],
            "vendor_id": data["vendor_id"],
            "items": priced_items(data),
            "delivery_date": data["delivery_date"],
            "delivery_address": data.get("delivery_address").cloned().unwrap_or_else(|| json!("")),
            "subtotal": subtotal,
            "tax_rate": tax_rate,
            "tax_amount": tax_amount,
            "total": subtotal + tax_amount,
            "payment_terms": data.get("payment_terms").cloned().unwrap_or_else(|| json!("Net 30")),
            "metadata": data.get("metadata").cloned().unwrap_or_else(|| json!({})),
        })
    }

    fn required_approvals(&self, data: &Value) -> u32 {
        let total = items_subtotal(data);
        if total > 100_000.0 {
            2
        } else if total > 10_000.0 {
            1
        } else {
            0
        }
    }

    fn required_roles(&self, data: &Value) -> Vec<String> {
        let total = items_subtotal(data);
        if total > 100_000.0 {
            roles(&["Procurement Manager", "CFO", "CEO"])
        } else if total > 10_000.0 {
            roles(&["Procurement Manager", "CEO"])
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionStatus;

    fn entry(amount: f64) -> Value {
        json!({
            "entry_date": "2024-03-31",
            "description": "Quarter close accrual",
            "debits": [{"account_code": "6100", "amount": amount}],
            "credits": [{"account_code": "2100", "amount": amount}],
        })
    }

    #[test]
    fn test_balanced_entry_is_valid() {
        assert!(JournalEntryContract.validate(&entry(500.0)).is_ok());
    }

    #[test]
    fn test_unbalanced_entry() {
        let mut data = entry(500.0);
        data["credits"][0]["amount"] = json!(400.0);
        let err = JournalEntryContract.validate(&data).unwrap_err();
        assert!(err.contains("must equal credits"));
    }

    #[test]
    fn test_invalid_lines_and_fields() {
        let mut zero = entry(0.0);
        assert!(JournalEntryContract.validate(&zero).unwrap_err().contains("cannot be zero"));

        zero["debits"] = json!([]);
        assert!(JournalEntryContract.validate(&zero).is_err());

        let mut no_code = entry(10.0);
        no_code["credits"][0] = json!({"amount": 10.0});
        assert_eq!(
            JournalEntryContract.validate(&no_code).unwrap_err(),
            "Credit line 1: Missing required field: account_code"
        );

        let mut bad_date = entry(10.0);
        bad_date["entry_date"] = json!("31/03/2024");
        assert!(JournalEntryContract.validate(&bad_date).is_err());

        let missing = json!({"entry_date": "2024-01-01", "description": "x", "debits": []});
        assert_eq!(
            JournalEntryContract.validate(&missing).unwrap_err(),
            "Missing required field: credits"
        );
    }

    #[test]
    fn test_approval_tiers() {
        let c = JournalEntryContract;
        assert_eq!(c.required_approvals(&entry(10_000.0)), 0);
        assert_eq!(c.required_approvals(&entry(10_000.01)), 1);
        assert_eq!(c.required_approvals(&entry(75_000.0)), 2);
        assert_eq!(c.required_approvals(&entry(150_000.0)), 3);
        assert!(c.required_roles(&entry(5.0)).is_empty());
        assert_eq!(c.required_roles(&entry(60_000.0)), vec!["CFO", "Chief Accountant"]);
    }

    #[test]
    fn test_execute_normalizes() {
        let out = JournalEntryContract.execute(&entry(250.5));
        assert_eq!(out["entry_type"], "journal_entry");
        assert_eq!(out["total_amount"], 250.5);
        assert_eq!(out["balanced"], true);
        assert_eq!(out["reference"], "");
    }

    struct StubContract(&'static str);

    impl ContractPolicy for StubContract {
        fn name(&self) -> &str {
            "accounting_entry_contract"
        }
        fn version(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn validate(&self, _: &Value) -> std::result::Result<(), String> {
            Ok(())
        }
        fn execute(&self, data: &Value) -> Value {
            data.clone()
        }
        fn required_approvals(&self, _: &Value) -> u32 {
            0
        }
        fn required_roles(&self, _: &Value) -> Vec<String> {
            Vec::new()
        }
    }

    #[test]
    fn test_registry_versions() {
        let mut registry = ContractRegistry::with_defaults();
        assert!(registry.register(Box::new(JournalEntryContract)).is_err());
        registry.register(Box::new(StubContract("2.0.0"))).unwrap();

        let name = "accounting_entry_contract";
        assert_eq!(registry.versions(name), vec!["1.0.0", "2.0.0"]);
        assert_eq!(registry.get(name, None).unwrap().version(), "1.0.0");

        registry.set_active_version(name, "2.0.0").unwrap();
        assert_eq!(registry.active(name).unwrap().description(), "stub");
        assert!(registry.set_active_version(name, "9.9.9").is_err());

        registry.deprecate(name, "2.0.0").unwrap();
        assert!(matches!(registry.active(name), Err(ChainError::Validation(_))));
        assert!(registry.set_active_version(name, "2.0.0").is_err());

        let listed: Vec<_> = registry.list().into_iter().filter(|c| c.name == name).collect();
        assert_eq!(listed.len(), 2);
        assert!(listed[1].active && listed[1].deprecated);
        assert!(matches!(registry.active("payroll"), Err(ChainError::NotFound(_))));
    }

    #[test]
    fn test_prepare_transaction() {
        let registry = ContractRegistry::with_defaults();
        let (tx, policy) = prepare_transaction(
            &registry,
            "accounting_entry_contract",
            "journal_entry",
            "accounting",
            &entry(60_000.0),
            "0x1111111111111111111111111111111111111111",
            "sig",
        )
        .unwrap();

        assert_eq!(policy.required_approvals, 2);
        assert!(tx.approval_required);
        assert_eq!(tx.approval_count_required, 2);
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.data["total_amount"], 60_000.0);
        assert_eq!(tx.metadata["contract_version"], "1.0.0");
        assert!(tx.verify_integrity());

        let (small, policy) = prepare_transaction(
            &registry,
            "accounting_entry_contract",
            "journal_entry",
            "accounting",
            &entry(20.0),
            "0x1111111111111111111111111111111111111111",
            "sig",
        )
        .unwrap();
        assert!(!policy.requires_approval());
        assert!(small.is_block_eligible());
    }

    #[test]
    fn test_prepare_rejects_invalid_payload() {
        let registry = ContractRegistry::with_defaults();
        let err = prepare_transaction(
            &registry,
            "accounting_entry_contract",
            "journal_entry",
            "accounting",
            &json!({}),
            "0x1",
            "sig",
        )
        .unwrap_err();
        assert!(matches!(err, ChainError::Validation(_)));
    }

    fn invoice(unit_price: f64) -> Value {
        json!({
            "invoice_date": "2024-05-02",
            "customer_id": "CUST-7",
            "items": [
                {"description": "Consulting", "quantity": 2, "unit_price": unit_price},
                {"description": "Travel", "quantity": 1, "unit_price": 100.0},
            ],
        })
    }

    fn purchase_order(unit_price: f64) -> Value {
        json!({
            "po_date": "2024-05-02",
            "delivery_date": "2024-05-20",
            "vendor_id": "VEND-3",
            "items": [{"description": "Laptops", "quantity": 10, "unit_price": unit_price}],
        })
    }

    #[test]
    fn test_defaults_cover_every_module() {
        let registry = ContractRegistry::with_defaults();
        for name in [
            "accounting_entry_contract",
            "employee_contract",
            "sales_invoice_contract",
            "purchase_order_contract",
        ] {
            assert!(registry.active(name).is_ok(), "{} missing", name);
        }
    }

    #[test]
    fn test_employee_operations() {
        let c = EmployeeContract;
        let hire = json!({
            "operation": "hire",
            "employee_id": "E-42",
            "employee_name": "Sam Doe",
            "position": "Analyst",
            "department": "Finance",
            "start_date": "2024-07-01",
            "salary": 52_000,
        });
        assert!(c.validate(&hire).is_ok());
        assert_eq!(c.required_approvals(&hire), 1);
        assert_eq!(c.required_roles(&hire), vec!["HR Manager", "CEO"]);

        let out = c.execute(&hire);
        assert_eq!(out["details"]["department"], "Finance");
        assert!(out["details"].get("operation").is_none());

        let terminate = json!({"operation": "terminate", "employee_id": "E-42"});
        assert_eq!(
            c.validate(&terminate).unwrap_err(),
            "Missing required fields: termination_date, reason"
        );

        let rename = json!({"operation": "update", "employee_id": "E-42", "position": "Lead"});
        assert!(c.validate(&rename).is_ok());
        assert_eq!(c.required_approvals(&rename), 0);
        let raise = json!({"operation": "update", "employee_id": "E-42", "salary": 60_000});
        assert_eq!(c.required_approvals(&raise), 1);

        let promote = json!({"operation": "promote", "employee_id": "E-42"});
        assert!(c.validate(&promote).unwrap_err().starts_with("Invalid operation"));
    }

    #[test]
    fn test_sales_invoice() {
        let c = SalesInvoiceContract;
        assert!(c.validate(&invoice(500.0)).is_ok());
        assert_eq!(c.required_approvals(&invoice(500.0)), 0);
        assert_eq!(c.required_approvals(&invoice(30_000.0)), 1);
        assert_eq!(c.required_roles(&invoice(30_000.0)), vec!["Sales Manager", "CEO"]);

        let out = c.execute(&invoice(500.0));
        assert_eq!(out["subtotal"], 1100.0);
        assert_eq!(out["items"][0]["total"], 1000.0);
        assert_eq!(out["payment_terms"], "Net 30");

        let mut bad = invoice(500.0);
        bad["items"][1]["quantity"] = json!(0);
        assert_eq!(c.validate(&bad).unwrap_err(), "Item 2: Quantity must be greater than zero");
        bad["items"] = json!([]);
        assert!(c.validate(&bad).is_err());
    }

    #[test]
    fn test_purchase_order_tiers() {
        let c = PurchaseOrderContract;
        assert!(c.validate(&purchase_order(800.0)).is_ok());
        assert_eq!(c.required_approvals(&purchase_order(800.0)), 0);
        assert_eq!(c.required_approvals(&purchase_order(2_000.0)), 1);
        assert_eq!(c.required_approvals(&purchase_order(20_000.0)), 2);
        assert_eq!(
            c.required_roles(&purchase_order(20_000.0)),
            vec!["Procurement Manager", "CFO", "CEO"]
        );

        let mut late = purchase_order(800.0);
        late["delivery_date"] = json!("2024-04-01");
        assert!(c.validate(&late).unwrap_err().contains("cannot be before"));

        let mut negative = purchase_order(-1.0);
        assert!(c.validate(&negative).unwrap_err().contains("negative"));
        negative["po_date"] = json!("May 2nd");
        assert!(c.validate(&negative).unwrap_err().contains("date"));
    }
}
