/// Message store: the durable side of the relay. The router appends
/// fire-and-forget; history queries are served over REST independently of
/// live routing.
pub mod init;
pub mod models;

use models::{direct_key, group_key, Message, StoredMessage};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::Arc;
use tokio::sync::Mutex;

pub type DbPool = Arc<Mutex<Connection>>;

/// Create a connection pool (simplified for single-threaded SQLite)
pub fn create_pool(db_path: &str) -> SqliteResult<DbPool> {
    let conn = Connection::open(db_path)?;
    init::initialize_database(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Create an in-memory database for testing
pub fn create_test_pool() -> DbPool {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory DB");
    init::initialize_database(&conn).expect("Failed to initialize DB");
    Arc::new(Mutex::new(conn))
}

/// Database operations
pub struct Database;

impl Database {
    /// Append a message to the log under its conversation key.
    pub async fn append_message(pool: &DbPool, message: &Message) -> SqliteResult<StoredMessage> {
        let conn = pool.lock().await;
        let conversation = message.conversation_key();

        conn.execute(
            "INSERT INTO messages (conversation, sender, receiver, group_name, body, attachment, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                conversation,
                message.sender,
                message.receiver,
                message.group_name,
                message.text,
                message.attachment,
                message.timestamp,
            ],
        )?;

        let id = conn.last_insert_rowid();
        Ok(StoredMessage {
            id,
            sender: message.sender.clone(),
            receiver: message.receiver.clone(),
            group_name: message.group_name.clone(),
            text: message.text.clone(),
            attachment: message.attachment.clone(),
            timestamp: message.timestamp.clone(),
        })
    }

    /// All messages between two users, both directions, oldest first.
    pub async fn direct_history(pool: &DbPool, a: &str, b: &str) -> SqliteResult<Vec<StoredMessage>> {
        Self::conversation_history(pool, &direct_key(a, b)).await
    }

    /// All messages sent to a group, oldest first.
    pub async fn group_history(pool: &DbPool, group_name: &str) -> SqliteResult<Vec<StoredMessage>> {
        Self::conversation_history(pool, &group_key(group_name)).await
    }

    async fn conversation_history(pool: &DbPool, conversation: &str) -> SqliteResult<Vec<StoredMessage>> {
        let conn = pool.lock().await;

        let mut stmt = conn.prepare(
            "SELECT id, sender, receiver, group_name, body, attachment, timestamp
             FROM messages WHERE conversation = ?1 ORDER BY timestamp ASC, id ASC",
        )?;

        let messages = stmt
            .query_map(params![conversation], |row| {
                Ok(StoredMessage {
                    id: row.get(0)?,
                    sender: row.get(1)?,
                    receiver: row.get(2)?,
                    group_name: row.get(3)?,
                    text: row.get(4)?,
                    attachment: row.get(5)?,
                    timestamp: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }
}
