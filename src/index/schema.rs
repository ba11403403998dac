use rusqlite::{Connection, Result};

/// Initialize the index schema
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    // One row per (address, direction, hash); seq preserves insertion order
    conn.execute(
        "CREATE TABLE IF NOT EXISTS address_transactions (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            address TEXT NOT NULL,
            direction TEXT NOT NULL CHECK (direction IN ('inbound', 'outbound')),
            hash TEXT NOT NULL,
            block_number INTEGER NOT NULL,
            from_address TEXT NOT NULL,
            to_address TEXT,
            value TEXT NOT NULL,
            gas_price TEXT NOT NULL,
            gas_used INTEGER NOT NULL,
            created_at INTEGER DEFAULT (strftime('%s', 'now')),
            UNIQUE(address, direction, hash)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scan_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            last_processed_block INTEGER,
            last_updated INTEGER DEFAULT (strftime('%s', 'now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_address_transactions_address ON address_transactions(address)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_address_transactions_hash ON address_transactions(hash)",
        [],
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO scan_state (id, last_processed_block) VALUES (1, NULL)",
        [],
    )?;

    Ok(())
}

/// Run database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    // Single schema version so far
    initialize_schema(conn)
}
