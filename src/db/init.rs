/// Database schema initialization.
/// Sets up SQLite WAL mode and creates the message log on startup.
use rusqlite::{Connection, Result as SqliteResult};

/// Initialize database connection with WAL mode and schema
pub fn initialize_database(conn: &Connection) -> SqliteResult<()> {
    // Enable WAL mode (for file-based DB only, ignore error for in-memory)
    let _ = conn.execute("PRAGMA journal_mode = WAL", []);
    let _ = conn.execute("PRAGMA synchronous = NORMAL", []);

    create_schema(conn)?;

    Ok(())
}

fn create_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY,
            conversation TEXT NOT NULL,
            sender TEXT NOT NULL,
            receiver TEXT,
            group_name TEXT,
            body TEXT NOT NULL,
            attachment TEXT,
            timestamp TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation, timestamp);
        CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender);
        "#,
    )?;

    Ok(())
}
