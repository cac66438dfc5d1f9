//! Database persistence layer for AuditLedger

use crate::blockchain::Block;
use crate::error::{ChainError, Result};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

/// Append-only block storage. Loaded blocks are untrusted until the ledger
/// has verified them.
pub trait BlockStore: Send + Sync {
    /// Persist a new block. An index that already exists is an error.
    fn save_block(&self, block: &Block) -> Result<()>;
    /// All blocks in index order.
    fn load_blocks(&self) -> Result<Vec<Block>>;
    fn block_count(&self) -> Result<u64>;
}

fn check_contiguous(blocks: &[Block]) -> Result<()> {
    for (position, block) in blocks.iter().enumerate() {
        if block.index != position as u64 {
            return Err(ChainError::Corruption(format!(
                "Stored blocks are not contiguous: position {} holds index {}",
                position, block.index
            )));
        }
    }
    Ok(())
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite store. `":memory:"` gives a private in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                idx INTEGER PRIMARY KEY,
                block_hash TEXT NOT NULL,
                previous_hash TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                document TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::Database(format!("Failed to create blocks table: {}", e)))?;

        Ok(Database { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ChainError::Database("Mutex poisoned".to_string()))
    }
}

impl BlockStore for Database {
    fn save_block(&self, block: &Block) -> Result<()> {
        let document = serde_json::to_string(block)
            .map_err(|e| ChainError::Serialization(format!("Failed to serialize block: {}", e)))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO blocks (idx, block_hash, previous_hash, timestamp, document)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                block.index as i64,
                block.block_hash,
                block.previous_hash,
                block.timestamp as i64,
                document,
            ],
        )
        .map_err(|e| ChainError::Database(format!("Failed to save block {}: {}", block.index, e)))?;

        Ok(())
    }

    fn load_blocks(&self) -> Result<Vec<Block>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT idx, document FROM blocks ORDER BY idx ASC")
            .map_err(|e| ChainError::Database(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let idx: i64 = row.get(0)?;
                let document: String = row.get(1)?;
                Ok((idx, document))
            })
            .map_err(|e| ChainError::Database(format!("Failed to query blocks: {}", e)))?;

        let mut blocks = Vec::new();
        for row in rows {
            let (idx, document) =
                row.map_err(|e| ChainError::Database(format!("Failed to read row: {}", e)))?;
            let block: Block = serde_json::from_str(&document).map_err(|e| {
                ChainError::Corruption(format!("Block row {} is not a valid document: {}", idx, e))
            })?;
            if block.index as i64 != idx {
                return Err(ChainError::Corruption(format!(
                    "Block row {} holds a document for index {}",
                    idx, block.index
                )));
            }
            blocks.push(block);
        }

        check_contiguous(&blocks)?;
        Ok(blocks)
    }

    fn block_count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))
            .map_err(|e| ChainError::Database(format!("Failed to count blocks: {}", e)))?;
        Ok(count as u64)
    }
}

/// Simple in-memory store useful for tests and ephemeral runs. Clones share
/// the same block list.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    pub blocks: Arc<Mutex<Vec<Block>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for InMemoryPersistence {
    fn save_block(&self, block: &Block) -> Result<()> {
        let mut blocks = self
            .blocks
            .lock()
            .map_err(|_| ChainError::Database("Mutex poisoned".to_string()))?;
        if blocks.iter().any(|b| b.index == block.index) {
            return Err(ChainError::Database(format!(
                "Block {} is already stored",
                block.index
            )));
        }
        blocks.push(block.clone());
        blocks.sort_by_key(|b| b.index);
        Ok(())
    }

    fn load_blocks(&self) -> Result<Vec<Block>> {
        let blocks = self
            .blocks
            .lock()
            .map_err(|_| ChainError::Database("Mutex poisoned".to_string()))?;
        check_contiguous(&blocks)?;
        Ok(blocks.clone())
    }

    fn block_count(&self) -> Result<u64> {
        let blocks = self
            .blocks
            .lock()
            .map_err(|_| ChainError::Database("Mutex poisoned".to_string()))?;
        Ok(blocks.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{create_genesis_block, BlockBuilder};
    use serde_json::Map;

    fn two_blocks() -> Vec<Block> {
        let genesis = create_genesis_block(Map::new()).unwrap();
        let next = BlockBuilder::new(1)
            .previous_hash(genesis.block_hash.clone())
            .created_by("0xCEO")
            .build()
            .unwrap();
        vec![genesis, next]
    }

    #[test]
    fn test_database_open() {
        let db = Database::open(":memory:").unwrap();
        assert!(db.conn.lock().unwrap().is_autocommit());
        assert_eq!(db.block_count().unwrap(), 0);
    }

    #[test]
    fn test_database_round_trip() {
        let db = Database::open(":memory:").unwrap();
        let blocks = two_blocks();
        for b in &blocks {
            db.save_block(b).unwrap();
        }
        assert_eq!(db.block_count().unwrap(), 2);
        assert_eq!(db.load_blocks().unwrap(), blocks);
    }

    #[test]
    fn test_database_refuses_overwrite() {
        let db = Database::open(":memory:").unwrap();
        let blocks = two_blocks();
        db.save_block(&blocks[0]).unwrap();
        assert!(matches!(db.save_block(&blocks[0]), Err(ChainError::Database(_))));
        assert_eq!(db.block_count().unwrap(), 1);
    }

    #[test]
    fn test_database_detects_gap() {
        let db = Database::open(":memory:").unwrap();
        let blocks = two_blocks();
        db.save_block(&blocks[1]).unwrap();
        assert!(matches!(db.load_blocks(), Err(ChainError::Corruption(_))));
    }

    #[test]
    fn test_in_memory_clones_share_storage() {
        let store = InMemoryPersistence::new();
        let view = store.clone();
        for b in two_blocks() {
            store.save_block(&b).unwrap();
        }
        assert_eq!(view.block_count().unwrap(), 2);
        assert!(store.save_block(&two_blocks()[1]).is_err());
    }
}
