use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ObserverError, StorageError};
use crate::index::schema::{initialize_schema, run_migrations};
use crate::index::TransactionStore;
use crate::logging::{ErrorLogger, LogContext};
use crate::models::{Address, Direction, Transaction, Wei};

const SELECT_COLUMNS: &str =
    "hash, block_number, from_address, to_address, value, gas_price, gas_used";

/// Durable index backed by a single SQLite connection.
///
/// Each insert is one statement, so a reader never observes a partial entry.
/// Also persists the scan cursor in `scan_state`.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and initialize the schema
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory database for testing
    pub fn new_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        initialize_schema(&conn)?;
        run_migrations(&conn)?;

        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Lock("Failed to acquire lock".to_string()))
    }

    fn find_entry(
        conn: &Connection,
        address: &Address,
        direction: Direction,
        hash: &str,
    ) -> Result<Option<Transaction>, StorageError> {
        let sql = format!(
            "SELECT {} FROM address_transactions WHERE address = ?1 AND direction = ?2 AND hash = ?3",
            SELECT_COLUMNS
        );
        let stored = conn
            .query_row(&sql, params![address.as_str(), direction.as_str(), hash], StoredRow::from_row)
            .optional()?;

        stored.map(StoredRow::into_transaction).transpose()
    }
}

/// Raw column values before quantity parsing
struct StoredRow {
    hash: String,
    block_number: u64,
    from_address: String,
    to_address: Option<String>,
    value: String,
    gas_price: String,
    gas_used: u64,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(StoredRow {
            hash: row.get(0)?,
            block_number: row.get(1)?,
            from_address: row.get(2)?,
            to_address: row.get(3)?,
            value: row.get(4)?,
            gas_price: row.get(5)?,
            gas_used: row.get(6)?,
        })
    }

    fn into_transaction(self) -> Result<Transaction, StorageError> {
        let value = Wei::from_hex(&self.value)
            .map_err(|e| StorageError::Corrupt(format!("value of {}: {}", self.hash, e)))?;
        let gas_price = Wei::from_hex(&self.gas_price)
            .map_err(|e| StorageError::Corrupt(format!("gas_price of {}: {}", self.hash, e)))?;

        Ok(Transaction {
            hash: self.hash,
            block_number: self.block_number,
            from: Address::from(self.from_address),
            to: self.to_address.map(Address::from),
            value,
            gas_price,
            gas_used: self.gas_used,
        })
    }
}

impl TransactionStore for SqliteStore {
    fn insert(
        &self,
        address: &Address,
        transaction: &Transaction,
        direction: Direction,
    ) -> Result<bool, StorageError> {
        let conn = self.lock()?;

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO address_transactions
                (address, direction, hash, block_number, from_address, to_address, value, gas_price, gas_used)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                address.as_str(),
                direction.as_str(),
                transaction.hash,
                transaction.block_number,
                transaction.from.as_str(),
                transaction.to.as_ref().map(|to| to.as_str()),
                transaction.value.to_hex(),
                transaction.gas_price.to_hex(),
                transaction.gas_used,
            ],
        )?;

        if inserted == 1 {
            return Ok(true);
        }

        // Already present: the stored body must match
        if let Some(existing) = Self::find_entry(&conn, address, direction, &transaction.hash)? {
            if existing != *transaction {
                drop(conn);
                let violation = ObserverError::Invariant(format!(
                    "transaction {} re-indexed as {} with a different body",
                    transaction.hash, direction
                ));
                let context = LogContext::new("sqlite_store", "insert")
                    .with_address(address.as_str())
                    .with_transaction_hash(&transaction.hash)
                    .with_block_number(transaction.block_number);
                ErrorLogger::log_error(&violation, Some(context));
            }
        }

        Ok(false)
    }

    fn get(&self, address: &Address) -> Result<Vec<Transaction>, StorageError> {
        let conn = self.lock()?;

        let sql = format!(
            "SELECT {} FROM address_transactions WHERE address = ?1
             ORDER BY CASE direction WHEN 'inbound' THEN 0 ELSE 1 END, seq",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![address.as_str()], StoredRow::from_row)?;

        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row?.into_transaction()?);
        }

        Ok(transactions)
    }

    fn lookup_hash(&self, hash: &str) -> Result<Vec<(Address, Direction)>, StorageError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT address, direction FROM address_transactions WHERE hash = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![hash], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (address, direction) = row?;
            let direction = Direction::parse(&direction)
                .ok_or_else(|| StorageError::Corrupt(format!("unknown direction '{}'", direction)))?;
            entries.push((Address::from(address), direction));
        }

        Ok(entries)
    }

    fn address_count(&self) -> Result<usize, StorageError> {
        let conn = self.lock()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT address) FROM address_transactions",
            [],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }

    fn load_cursor(&self) -> Result<Option<u64>, StorageError> {
        let conn = self.lock()?;

        let block_number: Option<u64> = conn.query_row(
            "SELECT last_processed_block FROM scan_state WHERE id = 1",
            [],
            |row| row.get(0),
        )?;

        Ok(block_number)
    }

    fn save_cursor(&self, height: u64) -> Result<(), StorageError> {
        let conn = self.lock()?;

        conn.execute(
            "UPDATE scan_state SET last_processed_block = ?1, last_updated = strftime('%s', 'now') WHERE id = 1",
            params![height],
        )?;

        Ok(())
    }
}
