//! Generation and entry operations.
//!
//! A generation is created on first open or first write, holds at most one
//! response per request key, and is removed together with all of its
//! entries.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;
use url::Url;

use super::connection::CacheDb;
use crate::Error;
use crate::agent::GenerationStore;
use crate::request::{RequestKey, Response};

/// A stored snapshot of a network response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub key: RequestKey,
    /// Final URL of the captured response, after redirects.
    pub response_url: Url,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub stored_at: String,
}

impl CachedResponse {
    /// Capture a response for storage under `key`.
    pub fn capture(key: RequestKey, response: Response) -> Self {
        Self {
            key,
            response_url: response.url,
            status: response.status,
            status_text: response.status_text,
            headers: response.headers,
            body: response.body,
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Rebuild the response this entry was captured from.
    pub fn into_response(self) -> Response {
        Response {
            url: self.response_url,
            status: self.status,
            status_text: self.status_text,
            headers: self.headers,
            body: self.body,
        }
    }
}

const UPSERT_ENTRY: &str = "INSERT INTO entries (
        generation, key_hash, method, url, response_url, status, status_text, headers_json, body, stored_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
    ON CONFLICT(generation, key_hash) DO UPDATE SET
        method = excluded.method,
        url = excluded.url,
        response_url = excluded.response_url,
        status = excluded.status,
        status_text = excluded.status_text,
        headers_json = excluded.headers_json,
        body = excluded.body,
        stored_at = excluded.stored_at";

const ENSURE_GENERATION: &str = "INSERT OR IGNORE INTO generations (name, created_at) VALUES (?1, ?2)";

/// An entry encoded for the database thread.
struct EncodedEntry {
    key_hash: String,
    method: String,
    url: String,
    response_url: String,
    status: u16,
    status_text: String,
    headers_json: String,
    body: Vec<u8>,
    stored_at: String,
}

impl EncodedEntry {
    fn encode(entry: &CachedResponse) -> Result<Self, Error> {
        let headers_json = serde_json::to_string(&entry.headers).map_err(|e| Error::CacheWrite(e.to_string()))?;
        Ok(Self {
            key_hash: entry.key.digest(),
            method: entry.key.method.clone(),
            url: entry.key.url.to_string(),
            response_url: entry.response_url.to_string(),
            status: entry.status,
            status_text: entry.status_text.clone(),
            headers_json,
            body: entry.body.to_vec(),
            stored_at: entry.stored_at.clone(),
        })
    }

    fn upsert(&self, conn: &rusqlite::Connection, generation: &str) -> Result<(), rusqlite::Error> {
        conn.execute(
            UPSERT_ENTRY,
            params![
                generation,
                &self.key_hash,
                &self.method,
                &self.url,
                &self.response_url,
                self.status,
                &self.status_text,
                &self.headers_json,
                &self.body,
                &self.stored_at,
            ],
        )?;
        Ok(())
    }
}

fn parse_stored_url(raw: &str) -> Result<Url, Error> {
    Url::parse(raw).map_err(|e| Error::CorruptEntry(format!("{raw}: {e}")))
}

impl CacheDb {
    /// Create the named generation if it does not exist yet.
    pub async fn open_generation(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(ENSURE_GENERATION, params![name, now])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Names of all existing generations, oldest first.
    pub async fn generation_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM generations ORDER BY created_at ASC, name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a generation and every entry in it.
    ///
    /// Returns false if no generation had that name.
    pub async fn delete_generation(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM generations WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the entry stored for `key` in a generation.
    pub async fn get_entry(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>, Error> {
        let generation = generation.to_string();
        let key_hash = key.digest();
        self.conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, response_url, status, status_text, headers_json, body, stored_at
                     FROM entries WHERE generation = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![generation, key_hash], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u16>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Vec<u8>>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                });

                let (method, url, response_url, status, status_text, headers_json, body, stored_at) = match result {
                    Ok(row) => row,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };

                let url = parse_stored_url(&url)?;
                let response_url = parse_stored_url(&response_url)?;
                let headers = serde_json::from_str(&headers_json).map_err(|e| Error::CorruptEntry(e.to_string()))?;

                Ok(Some(CachedResponse {
                    key: RequestKey { method, url },
                    response_url,
                    status,
                    status_text,
                    headers,
                    body: Bytes::from(body),
                    stored_at,
                }))
            })
            .await
            .map_err(Error::from)
    }

    /// Store one entry, replacing whatever was stored for the same key.
    ///
    /// The generation is created if it does not exist.
    pub async fn put_entry(&self, generation: &str, entry: &CachedResponse) -> Result<(), Error> {
        let generation = generation.to_string();
        let encoded = EncodedEntry::encode(entry)?;
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(ENSURE_GENERATION, params![&generation, now])?;
                encoded.upsert(&tx, &generation)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Store a batch of entries in a single transaction.
    ///
    /// Either every entry is written or none is.
    pub async fn put_entries(&self, generation: &str, entries: &[CachedResponse]) -> Result<usize, Error> {
        let generation = generation.to_string();
        let encoded = entries.iter().map(EncodedEntry::encode).collect::<Result<Vec<_>, _>>()?;
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                tx.execute(ENSURE_GENERATION, params![&generation, now])?;
                for entry in &encoded {
                    entry.upsert(&tx, &generation)?;
                }
                tx.commit()?;
                Ok(encoded.len())
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries stored in a generation.
    pub async fn entry_count(&self, generation: &str) -> Result<u64, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE generation = ?1", params![generation], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl GenerationStore for CacheDb {
    async fn open(&self, generation: &str) -> Result<(), Error> {
        self.open_generation(generation).await
    }

    async fn names(&self) -> Result<Vec<String>, Error> {
        self.generation_names().await
    }

    async fn delete(&self, generation: &str) -> Result<bool, Error> {
        self.delete_generation(generation).await
    }

    async fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedResponse>, Error> {
        self.get_entry(generation, key).await
    }

    async fn put(&self, generation: &str, entry: CachedResponse) -> Result<(), Error> {
        self.put_entry(generation, &entry).await
    }

    async fn put_all(&self, generation: &str, entries: Vec<CachedResponse>) -> Result<usize, Error> {
        self.put_entries(generation, &entries).await
    }

    async fn entry_count(&self, generation: &str) -> Result<u64, Error> {
        CacheDb::entry_count(self, generation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(path: &str, body: &'static str) -> CachedResponse {
        let url = Url::parse("https://app.example.com").unwrap().join(path).unwrap();
        CachedResponse {
            key: RequestKey::get(url.clone()),
            response_url: url,
            status: 200,
            status_text: "OK".to_string(),
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: Bytes::from_static(body.as_bytes()),
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("/a.js", "console.log(1)");

        db.put_entry("v1", &entry).await.unwrap();

        let retrieved = db.get_entry("v1", &entry.key).await.unwrap().unwrap();
        assert_eq!(retrieved, entry);
    }

    #[tokio::test]
    async fn test_redirected_response_keeps_final_url() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = RequestKey::get(Url::parse("https://app.example.com/menu").unwrap());
        let response = Response {
            url: Url::parse("https://app.example.com/menu/index.html").unwrap(),
            status: 200,
            status_text: "OK".to_string(),
            headers: Vec::new(),
            body: Bytes::from_static(b"<ul></ul>"),
        };
        db.put_entry("v1", &CachedResponse::capture(key.clone(), response)).await.unwrap();

        let rebuilt = db.get_entry("v1", &key).await.unwrap().unwrap().into_response();

        assert_eq!(rebuilt.url.as_str(), "https://app.example.com/menu/index.html");
        assert_eq!(rebuilt.body, Bytes::from_static(b"<ul></ul>"));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("/a.js", "");
        assert!(db.get_entry("v1", &entry.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_generations_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("/a.js", "old");
        db.put_entry("v1", &entry).await.unwrap();

        assert!(db.get_entry("v2", &entry.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_same_key() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry("v1", &make_entry("/a.js", "first")).await.unwrap();
        let second = make_entry("/a.js", "second");
        db.put_entry("v1", &second).await.unwrap();

        let retrieved = db.get_entry("v1", &second.key).await.unwrap().unwrap();
        assert_eq!(retrieved.body, Bytes::from_static(b"second"));
        assert_eq!(db.entry_count("v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_open_generation_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_generation("v1").await.unwrap();
        db.open_generation("v1").await.unwrap();

        assert_eq!(db.generation_names().await.unwrap(), vec!["v1".to_string()]);
        assert_eq!(db.entry_count("v1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_cascades_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("/", "<html></html>");
        db.put_entry("v1", &entry).await.unwrap();

        assert!(db.delete_generation("v1").await.unwrap());
        assert!(!db.delete_generation("v1").await.unwrap());
        assert!(db.generation_names().await.unwrap().is_empty());
        assert_eq!(db.entry_count("v1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_entries_batch() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entries = vec![make_entry("/", "root"), make_entry("/a.js", "script")];

        let stored = db.put_entries("v1", &entries).await.unwrap();

        assert_eq!(stored, 2);
        assert_eq!(db.entry_count("v1").await.unwrap(), 2);
    }
}
