#![forbid(unsafe_code)]
//! AuditLedger command-line interface

use auditledger::blockchain::{Block, Ledger};
use auditledger::cli::{init_logging, open_ledger, open_ledger_for_audit, restore_pending, save_pending};
use auditledger::config::{load_config_from, Config, DEFAULT_CONFIG_PATH};
use auditledger::policy::{prepare_transaction, ContractRegistry};
use auditledger::security::{validate_signature_format, validate_wallet_address};
use auditledger::transaction::{Transaction, TransactionStatus};
use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Color as TableColor;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store and its genesis block if they do not exist
    Init,
    /// Print chain statistics
    Stats,
    /// Verify every block and link
    Verify,
    /// Recompute every stored hash and list tampering, even on a corrupt store
    Audit,
    /// Export the chain as one JSON document
    Export {
        file: PathBuf,
    },
    /// Validate a payload with a contract and queue the resulting transaction
    Submit {
        /// Contract name, e.g. accounting_entry_contract
        contract: String,
        /// JSON file holding the payload
        data_file: PathBuf,
        #[arg(long)]
        wallet: String,
        #[arg(long)]
        signature: String,
        #[arg(long = "type", default_value = "journal_entry")]
        transaction_type: String,
        #[arg(long, default_value = "accounting")]
        module: String,
        /// Seal a block right away if the transaction is eligible
        #[arg(long)]
        seal: bool,
    },
    /// Record an approval on a pending transaction
    Approve {
        id: String,
        #[arg(long)]
        wallet: String,
        #[arg(long)]
        signature: String,
        #[arg(long)]
        role: String,
    },
    /// Reject a pending transaction
    Reject {
        id: String,
        #[arg(long)]
        wallet: String,
        #[arg(long)]
        signature: String,
        #[arg(long)]
        role: String,
        #[arg(long)]
        reason: String,
    },
    /// List pending transactions
    Pending,
    /// Seal eligible pending transactions into a new block
    Seal {
        #[arg(long)]
        max: Option<usize>,
    },
    /// Show one block
    Show {
        index: u64,
    },
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() -> CliResult {
    let cli = Cli::parse();
    let config = load_config_from(&cli.config)?;
    init_logging(&config.logging);

    match cli.command {
        Commands::Init => init(&config),
        Commands::Stats => stats(&config),
        Commands::Verify => verify(&config),
        Commands::Audit => audit(&config),
        Commands::Export { file } => {
            let ledger = open_ledger(&config)?;
            ledger.export_chain(&file)?;
            println!("{} {}", "✅ Chain exported to".bright_green(), file.display());
            Ok(())
        }
        Commands::Submit { contract, data_file, wallet, signature, transaction_type, module, seal } => {
            submit(&config, &contract, &data_file, &wallet, &signature, &transaction_type, &module, seal)
        }
        Commands::Approve { id, wallet, signature, role } => {
            approve(&config, &id, &wallet, &signature, &role)
        }
        Commands::Reject { id, wallet, signature, role, reason } => {
            let mut ledger = open_with_pending(&config)?;
            check_identity(&wallet, &signature)?;
            ledger.reject_pending(&id, &wallet, &signature, &role, &reason)?;
            ledger.discard_rejected();
            save_pending(&config, &ledger)?;
            println!("{} {}", "🛑 Rejected".bright_red().bold(), id);
            Ok(())
        }
        Commands::Pending => {
            let ledger = open_with_pending(&config)?;
            print_pending(ledger.pending_transactions());
            Ok(())
        }
        Commands::Seal { max } => {
            let mut ledger = open_with_pending(&config)?;
            seal_block(&config, &mut ledger, max)
        }
        Commands::Show { index } => {
            let ledger = open_ledger(&config)?;
            let block = ledger
                .block_by_index(index)
                .ok_or_else(|| format!("No block at index {}", index))?;
            print_block(block);
            Ok(())
        }
    }
}

fn open_with_pending(config: &Config) -> Result<Ledger, Box<dyn std::error::Error>> {
    let mut ledger = open_ledger(config)?;
    restore_pending(config, &mut ledger)?;
    Ok(ledger)
}

fn check_identity(wallet: &str, signature: &str) -> CliResult {
    if !validate_wallet_address(wallet) {
        return Err(format!("Invalid wallet address '{}': expected 0x followed by 40 hex digits", wallet).into());
    }
    if !validate_signature_format(signature) {
        return Err("Signature must be at least 64 characters".into());
    }
    Ok(())
}

fn init(config: &Config) -> CliResult {
    let ledger = open_ledger(config)?;
    let genesis = &ledger.blocks()[0];
    println!("{}", "🔗 Ledger ready".bright_green().bold());
    println!("   Store:   {}", config.storage.path.cyan());
    println!("   Genesis: {}", genesis.block_hash.bright_yellow());
    println!("   Blocks:  {}", ledger.height());
    Ok(())
}

fn stats(config: &Config) -> CliResult {
    let ledger = open_with_pending(config)?;
    let stats = ledger.stats();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Metric").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
        ]);
    table.add_row(vec![Cell::new("Blocks"), Cell::new(stats.total_blocks)]);
    table.add_row(vec![Cell::new("Transactions"), Cell::new(stats.total_transactions)]);
    table.add_row(vec![Cell::new("Pending"), Cell::new(stats.pending_transactions)]);
    table.add_row(vec![Cell::new("Latest index"), Cell::new(stats.latest_block_index)]);
    table.add_row(vec![Cell::new("Latest hash"), Cell::new(&stats.latest_block_hash)]);
    table.add_row(vec![Cell::new("Genesis time"), Cell::new(format_millis(stats.genesis_timestamp))]);
    table.add_row(vec![
        Cell::new("Chain valid"),
        if stats.chain_valid {
            Cell::new("yes").fg(TableColor::Green)
        } else {
            Cell::new("NO").fg(TableColor::Red)
        },
    ]);

    println!("{}", "📊 Ledger statistics".bright_cyan().bold());
    println!("{table}");
    Ok(())
}

fn verify(config: &Config) -> CliResult {
    let ledger = open_ledger_for_audit(config)?;
    let report = ledger.chain_report();
    if report.is_valid() {
        println!(
            "{} {} blocks verified",
            "✅ Chain valid:".bright_green().bold(),
            ledger.height()
        );
        return Ok(());
    }

    println!("{}", "❌ Chain verification failed".bright_red().bold());
    for error in &report.errors {
        println!("   • {}", error.red());
    }
    std::process::exit(1);
}

fn audit(config: &Config) -> CliResult {
    let ledger = open_ledger_for_audit(config)?;
    let report = ledger.detect_tampering();

    println!(
        "{} {} blocks, {} transactions checked",
        "🔍 Audit:".bright_cyan().bold(),
        report.checked_blocks,
        report.checked_transactions
    );
    if !report.tampered {
        println!("{}", "✅ No tampering detected".bright_green());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Block").add_attribute(Attribute::Bold),
            Cell::new("Issue").add_attribute(Attribute::Bold),
            Cell::new("Detail").add_attribute(Attribute::Bold),
        ]);
    for issue in &report.issues {
        table.add_row(vec![
            Cell::new(issue.block_index()),
            Cell::new(issue.kind()).fg(TableColor::Red),
            Cell::new(issue.to_string()),
        ]);
    }
    println!("{table}");
    println!("{}", format!("⚠️  {} issue(s) found", report.issues.len()).bright_red().bold());
    std::process::exit(2);
}

#[allow(clippy::too_many_arguments)]
fn submit(
    config: &Config,
    contract: &str,
    data_file: &Path,
    wallet: &str,
    signature: &str,
    transaction_type: &str,
    module: &str,
    seal: bool,
) -> CliResult {
    check_identity(wallet, signature)?;
    let payload: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(data_file)?)?;

    let registry = ContractRegistry::with_defaults();
    let (tx, policy) = prepare_transaction(&registry, contract, transaction_type, module, &payload, wallet, signature)?;
    let id = tx.transaction_id.clone();

    let mut ledger = open_with_pending(config)?;
    let hash = ledger.add_transaction(tx)?;

    println!("{}", "📝 Transaction queued".bright_green().bold());
    println!("   ID:   {}", id.bright_yellow());
    println!("   Hash: {}", hash);
    if policy.requires_approval() {
        println!(
            "   Needs {} approval(s) from: {}",
            policy.required_approvals.to_string().bright_magenta(),
            policy.allowed_roles.join(", ")
        );
    }

    if seal {
        return seal_block(config, &mut ledger, None);
    }
    save_pending(config, &ledger)?;
    Ok(())
}

fn approve(config: &Config, id: &str, wallet: &str, signature: &str, role: &str) -> CliResult {
    check_identity(wallet, signature)?;
    let mut ledger = open_with_pending(config)?;

    let pending = ledger
        .pending_transactions()
        .iter()
        .find(|tx| tx.transaction_id == id)
        .ok_or_else(|| format!("No pending transaction with id {}", id))?;
    let allowed: Vec<&str> = pending
        .metadata
        .get("allowed_roles")
        .and_then(|v| v.as_array())
        .map(|roles| roles.iter().filter_map(|r| r.as_str()).collect())
        .unwrap_or_default();
    if !allowed.is_empty() && !allowed.contains(&role) {
        return Err(format!("Role '{}' may not approve this transaction (allowed: {})", role, allowed.join(", ")).into());
    }

    let tx = ledger.approve_pending(id, wallet, signature, role)?;
    println!(
        "{} {}/{} approvals, status {}",
        "✍️  Approval recorded:".bright_green().bold(),
        tx.approval_count(),
        tx.approval_count_required,
        status_label(tx.status)
    );
    save_pending(config, &ledger)?;
    Ok(())
}

fn seal_block(config: &Config, ledger: &mut Ledger, max: Option<usize>) -> CliResult {
    let creator = config.ledger.creator_wallet.clone();
    match ledger.create_block(&creator, max)? {
        Some(block) => {
            println!(
                "{} #{} with {} transaction(s)",
                "⛓️  Sealed block".bright_green().bold(),
                block.index,
                block.transaction_count()
            );
            println!("   Hash: {}", block.block_hash.bright_yellow());
        }
        None => println!("{}", "Nothing eligible to seal".yellow()),
    }
    save_pending(config, ledger)?;
    Ok(())
}

fn status_label(status: TransactionStatus) -> ColoredString {
    match status {
        TransactionStatus::Pending => status.as_str().yellow(),
        TransactionStatus::Approved => status.as_str().green(),
        TransactionStatus::Rejected => status.as_str().red(),
        TransactionStatus::Executed => status.as_str().cyan(),
    }
}

fn format_millis(millis: u64) -> String {
    chrono::DateTime::from_timestamp_millis(millis as i64)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn transaction_table(transactions: &[Transaction]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").add_attribute(Attribute::Bold),
            Cell::new("Type").add_attribute(Attribute::Bold),
            Cell::new("Module").add_attribute(Attribute::Bold),
            Cell::new("Approvals").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Hash").add_attribute(Attribute::Bold),
        ]);
    for tx in transactions {
        let status_color = match tx.status {
            TransactionStatus::Pending => TableColor::Yellow,
            TransactionStatus::Approved => TableColor::Green,
            TransactionStatus::Rejected => TableColor::Red,
            TransactionStatus::Executed => TableColor::Cyan,
        };
        let approvals = if tx.approval_required {
            format!("{}/{}", tx.approval_count(), tx.approval_count_required)
        } else {
            "-".to_string()
        };
        table.add_row(vec![
            Cell::new(&tx.transaction_id),
            Cell::new(&tx.transaction_type),
            Cell::new(&tx.module),
            Cell::new(approvals),
            Cell::new(tx.status.as_str()).fg(status_color),
            Cell::new(format!("{}...", tx.hash_short())),
        ]);
    }
    table
}

fn print_pending(transactions: &[Transaction]) {
    if transactions.is_empty() {
        println!("{}", "No pending transactions".yellow());
        return;
    }
    println!("{}", format!("⏳ {} pending transaction(s)", transactions.len()).bright_cyan().bold());
    println!("{}", transaction_table(transactions));
}

fn print_block(block: &Block) {
    println!("{}", format!("📦 Block #{}", block.index).bright_cyan().bold());
    println!("   Hash:       {}", block.block_hash.bright_yellow());
    println!("   Previous:   {}", block.previous_hash);
    println!("   Merkle:     {}", block.merkle_root.as_deref().unwrap_or("-"));
    println!("   Created by: {}", block.created_by);
    println!("   Time:       {}", format_millis(block.timestamp));
    println!(
        "   Integrity:  {}",
        if block.verify_integrity() { "ok".green() } else { "FAILED".red().bold() }
    );
    if !block.transactions.is_empty() {
        println!("{}", transaction_table(&block.transactions));
    }
}
