use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};

use crate::error::{AssistantError, Result};

const TODOS_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS todos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    todo TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT
)";

/// A single persisted todo row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: i64,
    #[serde(rename = "todo")]
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TodoItem {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            content: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }
}

/// The four operations the assistant may perform on the todo list.
pub trait TodoStore {
    /// Insert a todo and return its generated id.
    fn create_todo(&self, content: &str) -> Result<i64>;

    /// Delete a todo. Deleting an id that does not exist is a no-op.
    fn delete_todo_by_id(&self, id: i64) -> Result<()>;

    /// All todos in insertion order.
    fn get_all_todos(&self) -> Result<Vec<TodoItem>>;

    /// Todos whose content contains `query`, ignoring case.
    fn search_todo(&self, query: &str) -> Result<Vec<TodoItem>>;
}

/// SQLite backed store. Each operation is a single statement.
pub struct SqliteTodoStore {
    conn: Connection,
}

impl SqliteTodoStore {
    /// Open (or create) the database at `url`. `:memory:` gives a private in-memory database.
    pub fn open(url: &str, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(url)?;
        conn.busy_timeout(busy_timeout)?;
        info!("Opened todo database at {}", url);
        Self::with_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        // SQLite's own lower() and LIKE only fold ASCII
        conn.create_scalar_function(
            "casefold",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| Ok(ctx.get::<String>(0)?.to_lowercase()),
        )?;
        conn.execute(TODOS_SCHEMA, [])?;
        Ok(Self { conn })
    }
}

impl TodoStore for SqliteTodoStore {
    fn create_todo(&self, content: &str) -> Result<i64> {
        if content.trim().is_empty() {
            return Err(AssistantError::Persistence(
                "todo content must not be empty".to_string(),
            ));
        }
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO todos (todo, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![content, now],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!("Inserted todo {}", id);
        Ok(id)
    }

    fn delete_todo_by_id(&self, id: i64) -> Result<()> {
        let removed = self
            .conn
            .execute("DELETE FROM todos WHERE id = ?1", params![id])?;
        if removed == 0 {
            debug!("No todo with id {} to delete", id);
        }
        Ok(())
    }

    fn get_all_todos(&self) -> Result<Vec<TodoItem>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, todo, created_at, updated_at FROM todos ORDER BY id")?;
        let todos = stmt
            .query_map([], TodoItem::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(todos)
    }

    fn search_todo(&self, query: &str) -> Result<Vec<TodoItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, todo, created_at, updated_at FROM todos
             WHERE instr(casefold(todo), casefold(?1)) > 0 ORDER BY id",
        )?;
        let todos = stmt
            .query_map(params![query], TodoItem::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(todos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteTodoStore {
        SqliteTodoStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_create_then_list() {
        let store = store();
        let id = store.create_todo("Buy milk").unwrap();

        let todos = store.get_all_todos().unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].id, id);
        assert_eq!(todos[0].content, "Buy milk");
        assert_eq!(todos[0].updated_at, Some(todos[0].created_at));
    }

    #[test]
    fn test_ids_are_unique_and_never_reused() {
        let store = store();
        let first = store.create_todo("one").unwrap();
        let second = store.create_todo("two").unwrap();
        assert_ne!(first, second);

        store.delete_todo_by_id(second).unwrap();
        let third = store.create_todo("three").unwrap();
        assert!(third > second);
    }

    #[test]
    fn test_empty_content_is_rejected() {
        let store = store();
        assert!(matches!(
            store.create_todo(""),
            Err(AssistantError::Persistence(_))
        ));
        assert!(store.create_todo("   ").is_err());
        assert!(store.get_all_todos().unwrap().is_empty());
    }

    #[test]
    fn test_delete_missing_id_is_noop() {
        let store = store();
        store.create_todo("keep me").unwrap();
        let before = store.get_all_todos().unwrap();

        store.delete_todo_by_id(9999).unwrap();

        assert_eq!(store.get_all_todos().unwrap(), before);
    }

    #[test]
    fn test_delete_removes_row() {
        let store = store();
        let id = store.create_todo("walk the dog").unwrap();
        let other = store.create_todo("water plants").unwrap();

        store.delete_todo_by_id(id).unwrap();

        let todos = store.get_all_todos().unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].id, other);
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let store = store();
        let milk = store.create_todo("Buy MILK and eggs").unwrap();
        store.create_todo("Call mom").unwrap();
        let oat = store.create_todo("oat milk latte").unwrap();

        let ids: Vec<i64> = store
            .search_todo("milk")
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![milk, oat]);

        assert!(store.search_todo("groceries").unwrap().is_empty());
    }

    #[test]
    fn test_search_folds_non_ascii_case() {
        let store = store();
        let apples = store.create_todo("Äpfel kaufen").unwrap();
        let school = store.create_todo("ÉCOLE inscription").unwrap();
        store.create_todo("Birnen kaufen").unwrap();

        let hits = store.search_todo("äpfel").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, apples);

        let hits = store.search_todo("école").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, school);

        assert_eq!(store.search_todo("KAUFEN").unwrap().len(), 2);
    }

    #[test]
    fn test_search_treats_wildcards_literally() {
        let store = store();
        let pct = store.create_todo("raise price 10%").unwrap();
        store.create_todo("raise price 100").unwrap();
        store.create_todo("snake_case rename").unwrap();

        let hits = store.search_todo("10%").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, pct);

        assert_eq!(store.search_todo("e_c").unwrap().len(), 1);
    }

    #[test]
    fn test_list_is_idempotent() {
        let store = store();
        store.create_todo("a").unwrap();
        store.create_todo("b").unwrap();

        assert_eq!(store.get_all_todos().unwrap(), store.get_all_todos().unwrap());
    }

    #[test]
    fn test_reopen_file_database_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("todos.db");
        let path = path.to_str().unwrap();

        let id = {
            let store = SqliteTodoStore::open(path, Duration::from_secs(1)).unwrap();
            store.create_todo("persist me").unwrap()
        };

        let store = SqliteTodoStore::open(path, Duration::from_secs(1)).unwrap();
        let todos = store.get_all_todos().unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].id, id);
    }
}
