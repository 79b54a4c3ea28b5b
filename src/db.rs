use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

use crate::store::TabularStore;

/// Local spreadsheet emulation: each partition is a list of JSON-encoded rows.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let store = Self {
            conn,
            path: path.to_path_buf(),
        };
        store.init()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_path() -> PathBuf {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "hunt") {
            proj_dirs.data_dir().join("jobs.db")
        } else {
            PathBuf::from("jobs.db")
        }
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS partitions (
                name TEXT PRIMARY KEY,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS sheet_rows (
                partition TEXT NOT NULL REFERENCES partitions(name),
                row_no INTEGER NOT NULL,
                cells TEXT NOT NULL,
                PRIMARY KEY (partition, row_no)
            );
            "#,
        )?;
        Ok(())
    }

    fn ensure_exists(&self, partition: &str) -> Result<()> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM partitions WHERE name = ?1",
                [partition],
                |row| row.get(0),
            )
            .optional()?;
        found
            .map(|_| ())
            .ok_or_else(|| anyhow!("no such partition: {}", partition))
    }
}

impl TabularStore for SqliteStore {
    fn partitions(&mut self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM partitions ORDER BY created_at, name")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<String>, _>>()
            .context("Failed to list partitions")
    }

    fn create_partition(&mut self, name: &str) -> Result<()> {
        self.conn
            .execute("INSERT OR IGNORE INTO partitions (name) VALUES (?1)", [name])?;
        Ok(())
    }

    fn read_rows(&mut self, partition: &str) -> Result<Vec<Vec<String>>> {
        self.ensure_exists(partition)?;
        let mut stmt = self
            .conn
            .prepare("SELECT cells FROM sheet_rows WHERE partition = ?1 ORDER BY row_no")?;
        let raw = stmt
            .query_map([partition], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        raw.iter()
            .map(|cells| {
                serde_json::from_str::<Vec<String>>(cells)
                    .with_context(|| format!("corrupt row in partition {}", partition))
            })
            .collect()
    }

    fn read_header(&mut self, partition: &str) -> Result<Vec<String>> {
        self.ensure_exists(partition)?;
        let cells: Option<String> = self
            .conn
            .query_row(
                "SELECT cells FROM sheet_rows WHERE partition = ?1 AND row_no = 1",
                [partition],
                |row| row.get(0),
            )
            .optional()?;
        match cells {
            Some(cells) => Ok(serde_json::from_str(&cells)?),
            None => Ok(Vec::new()),
        }
    }

    fn write_header(&mut self, partition: &str, header: &[String]) -> Result<()> {
        self.ensure_exists(partition)?;
        self.conn.execute(
            "INSERT INTO sheet_rows (partition, row_no, cells) VALUES (?1, 1, ?2)
             ON CONFLICT(partition, row_no) DO UPDATE SET cells = excluded.cells",
            params![partition, serde_json::to_string(header)?],
        )?;
        Ok(())
    }

    fn append_rows(&mut self, partition: &str, rows: &[Vec<String>]) -> Result<usize> {
        self.ensure_exists(partition)?;
        let tx = self.conn.transaction()?;
        let last: i64 = tx.query_row(
            "SELECT COALESCE(MAX(row_no), 1) FROM sheet_rows WHERE partition = ?1",
            [partition],
            |row| row.get(0),
        )?;
        for (offset, row) in rows.iter().enumerate() {
            tx.execute(
                "INSERT INTO sheet_rows (partition, row_no, cells) VALUES (?1, ?2, ?3)",
                params![partition, last + 1 + offset as i64, serde_json::to_string(row)?],
            )?;
        }
        tx.commit()?;
        Ok(rows.len())
    }
}
