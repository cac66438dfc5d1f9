//! Helpers shared by the command-line binary.

use crate::blockchain::Ledger;
use crate::config::{load_config, Config, LoggingConfig};
use crate::error::Result;
use crate::persistence::Database;
use crate::transaction::Transaction;
use std::io;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).try_init().ok();
}

/// Open the SQLite store named in `config`, creating its directory if needed.
pub fn open_database(config: &Config) -> Result<Database> {
    let path = config.storage.path.as_str();
    if path != ":memory:" {
        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
    }
    Database::open(path)
}

/// Strictly verified ledger over the configured store.
pub fn open_ledger(config: &Config) -> Result<Ledger> {
    Ledger::with_config(Box::new(open_database(config)?), config.ledger.settings())
}

/// Read-only view over the configured store, even when it is corrupt.
pub fn open_ledger_for_audit(config: &Config) -> Result<Ledger> {
    Ledger::open_for_audit(Box::new(open_database(config)?))
}

/// Reload the pending pool saved by an earlier invocation. A missing or empty
/// file means there is nothing to restore; any other read failure is an error.
pub fn restore_pending(config: &Config, ledger: &mut Ledger) -> Result<usize> {
    let saved = match std::fs::read_to_string(&config.storage.pending_path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    if saved.trim().is_empty() {
        return Ok(0);
    }
    let transactions: Vec<Transaction> = serde_json::from_str(&saved)?;
    ledger.import_pending(transactions)
}

/// Write the pending pool so the next invocation can pick it up.
pub fn save_pending(config: &Config, ledger: &Ledger) -> Result<()> {
    let path = Path::new(&config.storage.pending_path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(ledger.pending_transactions())?)?;
    Ok(())
}

pub fn load_ledger_from_config() -> Result<(Config, Ledger)> {
    let config = load_config()?;
    let ledger = open_ledger(&config)?;
    Ok((config, ledger))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_open_ledger_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("ledger.db");
        let mut config = parse_config("").unwrap();
        config.storage.path = db_path.to_string_lossy().into_owned();

        let ledger = open_ledger(&config).unwrap();
        assert_eq!(ledger.height(), 1);
        assert!(db_path.exists());

        let audit = open_ledger_for_audit(&config).unwrap();
        assert!(!audit.is_read_only());
        assert_eq!(audit.blocks()[0].block_hash, ledger.blocks()[0].block_hash);
    }

    #[test]
    fn test_pending_pool_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = parse_config("").unwrap();
        config.storage.path = ":memory:".to_string();
        config.storage.pending_path = dir.path().join("pending.json").to_string_lossy().into_owned();

        let mut ledger = open_ledger(&config).unwrap();
        assert_eq!(restore_pending(&config, &mut ledger).unwrap(), 0);

        let tx = crate::transaction::TransactionBuilder::new()
            .transaction_type("journal_entry")
            .module("accounting")
            .wallet("0x1111111111111111111111111111111111111111")
            .signature("sig")
            .approval_requirements(true, 1)
            .build()
            .unwrap();
        ledger.add_transaction(tx).unwrap();
        save_pending(&config, &ledger).unwrap();

        let mut next = open_ledger(&config).unwrap();
        assert_eq!(restore_pending(&config, &mut next).unwrap(), 1);
        assert_eq!(next.pending_transactions(), ledger.pending_transactions());
    }

    #[test]
    fn test_unreadable_pending_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = parse_config("").unwrap();
        config.storage.path = ":memory:".to_string();
        let pending = dir.path().join("pending.json");
        config.storage.pending_path = pending.to_string_lossy().into_owned();

        std::fs::write(&pending, [0xff, 0xfe, 0x00, 0x80]).unwrap();
        let mut ledger = open_ledger(&config).unwrap();
        assert!(restore_pending(&config, &mut ledger).is_err());
        assert_eq!(std::fs::read(&pending).unwrap(), vec![0xff, 0xfe, 0x00, 0x80]);

        std::fs::remove_file(&pending).unwrap();
        std::fs::create_dir(&pending).unwrap();
        assert!(restore_pending(&config, &mut ledger).is_err());

        std::fs::remove_dir(&pending).unwrap();
        std::fs::write(&pending, "  \n").unwrap();
        assert_eq!(restore_pending(&config, &mut ledger).unwrap(), 0);
    }

    #[test]
    fn test_audit_of_missing_store_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("ledger.db");
        let mut config = parse_config("").unwrap();
        config.storage.path = db_path.to_string_lossy().into_owned();

        assert!(open_ledger_for_audit(&config).is_err());
        let store = open_database(&config).unwrap();
        assert_eq!(crate::persistence::BlockStore::block_count(&store).unwrap(), 0);
    }
}
