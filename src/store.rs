//! Durable, deduplicated fragment persistence for one collection.
//!
//! Each [`FragmentStore`] owns one SQLite file; the public and private
//! collections are separate stores over separate files, never flagged
//! rows in a shared table. Writes are serialized through a per-store
//! mutex; reads take a consistent snapshot via a single SELECT, so an
//! in-flight search never observes a half-written row (the insert is one
//! atomic statement committing content, hash, embedding, and metadata
//! together).

use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::Result;
use crate::models::{CollectionStats, Fragment, FragmentMetadata, Visibility};

pub struct FragmentStore {
    pool: SqlitePool,
    path: PathBuf,
    visibility: Visibility,
    // Single-writer lock: put/delete serialize against each other.
    write_lock: Mutex<()>,
}

impl FragmentStore {
    /// Open (creating if missing) the store backing one collection.
    pub async fn open(path: PathBuf, visibility: Visibility) -> Result<Self> {
        let pool = db::connect(&path).await?;
        db::run_migrations(&pool).await?;

        Ok(Self {
            pool,
            path,
            visibility,
            write_lock: Mutex::new(()),
        })
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Look up a fragment id by content hash.
    ///
    /// Used by the engine to skip embedding entirely when the content is
    /// already stored; the embedding step is the expensive one.
    pub async fn find_by_hash(&self, content_hash: &str) -> Result<Option<String>> {
        let id: Option<String> =
            sqlx::query_scalar("SELECT id FROM fragments WHERE content_hash = ?")
                .bind(content_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id)
    }

    /// Insert a fragment, returning the existing id if the hash is
    /// already present (idempotent insert).
    ///
    /// The caller computes the embedding before calling this, so the
    /// write lock is held only for the hash-check-and-insert step.
    pub async fn insert(
        &self,
        content: &str,
        content_hash: &str,
        embedding: &[f32],
        metadata: &FragmentMetadata,
    ) -> Result<String> {
        let _guard = self.write_lock.lock().await;

        // Re-check under the lock: a concurrent insert of identical
        // content must return the first writer's id, not a second row.
        if let Some(existing) = self.find_by_hash(content_hash).await? {
            debug!(collection = %self.visibility, id = %existing, "duplicate content, returning existing fragment");
            return Ok(existing);
        }

        let id = Uuid::new_v4().to_string();
        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let added_at = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO fragments (id, content, content_hash, embedding, metadata_json, added_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(content)
        .bind(content_hash)
        .bind(vec_to_blob(embedding))
        .bind(&metadata_json)
        .bind(added_at)
        .execute(&self.pool)
        .await?;

        debug!(collection = %self.visibility, id = %id, "fragment stored");
        Ok(id)
    }

    /// Return every fragment in insertion order.
    ///
    /// One SELECT statement, so the ranker's corpus statistics (document
    /// count, average length) are derived from a consistent snapshot.
    pub async fn get_all(&self) -> Result<Vec<Fragment>> {
        let rows = sqlx::query(
            "SELECT id, content, content_hash, embedding, metadata_json, added_at \
             FROM fragments ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut fragments = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let metadata_json: String = row.get("metadata_json");
            let metadata: FragmentMetadata = serde_json::from_str(&metadata_json)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

            fragments.push(Fragment {
                id: row.get("id"),
                content: row.get("content"),
                content_hash: row.get("content_hash"),
                embedding: blob_to_vec(&blob),
                metadata,
                added_at: row.get("added_at"),
            });
        }

        Ok(fragments)
    }

    /// Remove a fragment; returns whether it existed. Idempotent.
    pub async fn delete(&self, fragment_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query("DELETE FROM fragments WHERE id = ?")
            .bind(fragment_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fragments")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn stats(&self) -> Result<CollectionStats> {
        let fragments = self.count().await?;
        let newest_added_at: Option<i64> =
            sqlx::query_scalar("SELECT MAX(added_at) FROM fragments")
                .fetch_one(&self.pool)
                .await?;
        let db_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);

        Ok(CollectionStats {
            fragments,
            newest_added_at,
            db_size_bytes,
        })
    }
}

/// Normalize content for hashing and storage: trim, collapse runs of
/// whitespace to single spaces.
pub fn normalize_content(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deterministic dedup hash: SHA-256 of the normalized content, hex.
pub fn content_hash(normalized: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_content("  hello   world \n"), "hello world");
        assert_eq!(normalize_content("a\tb\nc"), "a b c");
        assert_eq!(normalize_content("   "), "");
    }

    #[test]
    fn test_hash_is_deterministic_and_normalization_sensitive() {
        let a = content_hash(&normalize_content("Unity uses C#"));
        let b = content_hash(&normalize_content("  Unity   uses C# "));
        assert_eq!(a, b);

        let c = content_hash(&normalize_content("Unity uses C++"));
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_insert_dedup_and_delete() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FragmentStore::open(tmp.path().join("test.db"), Visibility::Private)
            .await
            .unwrap();

        let normalized = normalize_content("Unity uses C#");
        let hash = content_hash(&normalized);
        let embedding = vec![0.1f32, 0.2, 0.3];

        let id1 = store
            .insert(&normalized, &hash, &embedding, &FragmentMetadata::default())
            .await
            .unwrap();
        let id2 = store
            .insert(&normalized, &hash, &embedding, &FragmentMetadata::default())
            .await
            .unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.count().await.unwrap(), 1);

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, normalized);
        assert_eq!(all[0].embedding, embedding);

        assert!(store.delete(&id1).await.unwrap());
        assert!(!store.delete(&id1).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_all_preserves_insertion_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FragmentStore::open(tmp.path().join("test.db"), Visibility::Public)
            .await
            .unwrap();

        for text in ["first fragment", "second fragment", "third fragment"] {
            let normalized = normalize_content(text);
            let hash = content_hash(&normalized);
            store
                .insert(&normalized, &hash, &[0.0], &FragmentMetadata::default())
                .await
                .unwrap();
        }

        let all = store.get_all().await.unwrap();
        let contents: Vec<&str> = all.iter().map(|f| f.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["first fragment", "second fragment", "third fragment"]
        );
    }
}
