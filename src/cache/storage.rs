//! Cache storage trait and its in-memory and SQLite implementations.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::http::{Request, Response};

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub response: Response,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// Storage is organised in named namespaces, each mapping request keys
/// (see [`Request::cache_key`]) to responses. Single operations are atomic;
/// concurrent writes to the same key are last-write-wins.
pub trait CacheStorage: Send + Sync {
  /// Names of all namespaces, oldest first.
  fn keys(&self) -> Result<Vec<String>>;

  /// Create the namespace if it does not exist.
  fn open(&self, namespace: &str) -> Result<()>;

  fn has(&self, namespace: &str) -> Result<bool>;

  /// Delete a namespace and its entries. Returns whether it existed.
  fn delete(&self, namespace: &str) -> Result<bool>;

  /// Store one entry, creating the namespace if needed.
  fn put(&self, namespace: &str, request: &Request, response: &Response) -> Result<()>;

  /// Store every entry or none of them.
  fn put_all(&self, namespace: &str, entries: &[(Request, Response)]) -> Result<()>;

  /// Exact-key lookup.
  fn match_request(&self, namespace: &str, request: &Request) -> Result<Option<CachedResponse>>;

  /// Request keys stored in a namespace, sorted.
  fn entries(&self, namespace: &str) -> Result<Vec<String>>;
}

type Namespaces = Vec<(String, HashMap<String, CachedResponse>)>;

/// Process-local storage. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStorage {
  /// Namespaces in creation order
  namespaces: Mutex<Namespaces>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<MutexGuard<'_, Namespaces>> {
    self
      .namespaces
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn namespace_mut<'a>(
  namespaces: &'a mut Namespaces,
  namespace: &str,
) -> &'a mut HashMap<String, CachedResponse> {
  let idx = match namespaces.iter().position(|(name, _)| name == namespace) {
    Some(idx) => idx,
    None => {
      namespaces.push((namespace.to_string(), HashMap::new()));
      namespaces.len() - 1
    }
  };
  &mut namespaces[idx].1
}

impl CacheStorage for MemoryStorage {
  fn keys(&self) -> Result<Vec<String>> {
    Ok(self.lock()?.iter().map(|(name, _)| name.clone()).collect())
  }

  fn open(&self, namespace: &str) -> Result<()> {
    let mut namespaces = self.lock()?;
    namespace_mut(&mut namespaces, namespace);
    Ok(())
  }

  fn has(&self, namespace: &str) -> Result<bool> {
    Ok(self.lock()?.iter().any(|(name, _)| name == namespace))
  }

  fn delete(&self, namespace: &str) -> Result<bool> {
    let mut namespaces = self.lock()?;
    let before = namespaces.len();
    namespaces.retain(|(name, _)| name != namespace);
    Ok(namespaces.len() != before)
  }

  fn put(&self, namespace: &str, request: &Request, response: &Response) -> Result<()> {
    let mut namespaces = self.lock()?;
    namespace_mut(&mut namespaces, namespace).insert(
      request.cache_key(),
      CachedResponse {
        response: response.clone(),
        cached_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn put_all(&self, namespace: &str, entries: &[(Request, Response)]) -> Result<()> {
    // Single lock acquisition, nothing can fail midway
    let mut namespaces = self.lock()?;
    let cache = namespace_mut(&mut namespaces, namespace);
    let cached_at = Utc::now();
    for (request, response) in entries {
      cache.insert(
        request.cache_key(),
        CachedResponse {
          response: response.clone(),
          cached_at,
        },
      );
    }
    Ok(())
  }

  fn match_request(&self, namespace: &str, request: &Request) -> Result<Option<CachedResponse>> {
    let namespaces = self.lock()?;
    Ok(
      namespaces
        .iter()
        .find(|(name, _)| name == namespace)
        .and_then(|(_, cache)| cache.get(&request.cache_key()).cloned()),
    )
  }

  fn entries(&self, namespace: &str) -> Result<Vec<String>> {
    let namespaces = self.lock()?;
    let mut keys: Vec<String> = namespaces
      .iter()
      .find(|(name, _)| name == namespace)
      .map(|(_, cache)| cache.keys().cloned().collect())
      .unwrap_or_default();
    keys.sort();
    Ok(keys)
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the storage at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open or create the storage at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("swcache").join("cache.db"))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS cache_namespaces (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS cache_entries (
    namespace TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    request_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    response_type TEXT NOT NULL,
    redirected INTEGER NOT NULL,
    url TEXT,
    cached_at TEXT NOT NULL,
    PRIMARY KEY (namespace, request_hash),
    FOREIGN KEY (namespace) REFERENCES cache_namespaces(name) ON DELETE CASCADE
);
"#;

/// SHA256 of the request key, for stable fixed-length primary keys.
fn request_hash(request: &Request) -> String {
  let mut hasher = Sha256::new();
  hasher.update(request.cache_key().as_bytes());
  hex::encode(hasher.finalize())
}

fn ensure_namespace(conn: &Connection, namespace: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_namespaces (name) VALUES (?)",
      params![namespace],
    )
    .map_err(|e| eyre!("Failed to create namespace {}: {}", namespace, e))?;
  Ok(())
}

fn insert_entry(
  conn: &Connection,
  namespace: &str,
  request: &Request,
  response: &Response,
  cached_at: &DateTime<Utc>,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries
         (namespace, request_hash, request_key, status, status_text, headers, body,
          response_type, redirected, url, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
      params![
        namespace,
        request_hash(request),
        request.cache_key(),
        response.status,
        response.status_text,
        headers,
        response.body,
        response.response_type.as_str(),
        response.redirected,
        response.url.as_ref().map(|u| u.as_str()),
        cached_at.to_rfc3339(),
      ],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", request.cache_key(), e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_namespaces ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list namespaces: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read namespace: {}", e))?;

    Ok(names)
  }

  fn open(&self, namespace: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_namespace(&conn, namespace)
  }

  fn has(&self, namespace: &str) -> Result<bool> {
    let conn = self.lock()?;
    let found: Option<i64> = conn
      .query_row(
        "SELECT 1 FROM cache_namespaces WHERE name = ?",
        params![namespace],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up namespace {}: {}", namespace, e))?;

    Ok(found.is_some())
  }

  fn delete(&self, namespace: &str) -> Result<bool> {
    let conn = self.lock()?;
    let removed = conn
      .execute(
        "DELETE FROM cache_namespaces WHERE name = ?",
        params![namespace],
      )
      .map_err(|e| eyre!("Failed to delete namespace {}: {}", namespace, e))?;

    Ok(removed > 0)
  }

  fn put(&self, namespace: &str, request: &Request, response: &Response) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_namespace(&tx, namespace)?;
    insert_entry(&tx, namespace, request, response, &Utc::now())?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn put_all(&self, namespace: &str, entries: &[(Request, Response)]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    // Dropping `tx` on an early return rolls everything back
    ensure_namespace(&tx, namespace)?;
    let cached_at = Utc::now();
    for (request, response) in entries {
      insert_entry(&tx, namespace, request, response, &cached_at)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn match_request(&self, namespace: &str, request: &Request) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    type Row = (
      u16,
      String,
      String,
      Vec<u8>,
      String,
      bool,
      Option<String>,
      String,
    );

    let row: Option<Row> = conn
      .query_row(
        "SELECT status, status_text, headers, body, response_type, redirected, url, cached_at
         FROM cache_entries WHERE namespace = ? AND request_hash = ?",
        params![namespace, request_hash(request)],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to query {}: {}", request.cache_key(), e))?;

    let Some((status, status_text, headers, body, response_type, redirected, url, cached_at)) = row
    else {
      return Ok(None);
    };

    let headers: Vec<(String, String)> = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
    let url = url
      .map(|u| url::Url::parse(&u))
      .transpose()
      .map_err(|e| eyre!("Invalid stored url: {}", e))?;

    Ok(Some(CachedResponse {
      response: Response {
        status,
        status_text,
        headers,
        body,
        response_type: response_type.parse()?,
        redirected,
        url,
      },
      cached_at: parse_datetime(&cached_at)?,
    }))
  }

  fn entries(&self, namespace: &str) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT request_key FROM cache_entries WHERE namespace = ? ORDER BY request_key")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map(params![namespace], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list entries: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read entry: {}", e))?;

    Ok(keys)
  }
}

/// Parse a stored RFC 3339 timestamp.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
