//! The persistent knowledge base: a named collection of fragments with
//! embeddings, backed by SQLite and served from an in-memory vector index.
//!
//! Lifecycle is explicit: `recreate` (flush + insert), `append`, or read-only
//! use. Both mutations run in a single SQLite transaction, and the in-memory
//! index is swapped in only after commit, so a reader always sees either the
//! previous generation or the new one — never a partially-flushed collection.
//! Writers are serialized by the connection lock; readers hold the inner
//! RwLock only for the duration of one lookup.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use rusqlite::{params, Connection};
use tracing::{debug, info};
use uuid::Uuid;

use tome_core::Fragment;

use crate::embedding::DynEmbeddingService;
use crate::error::IndexError;
use crate::index::VectorIndex;

/// A fragment returned from a nearest-neighbor query, with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFragment {
    pub fragment: Fragment,
    pub score: f64,
}

/// In-memory view of one collection generation.
#[derive(Default)]
struct KbInner {
    index: VectorIndex,
    fragments: HashMap<Uuid, Fragment>,
}

impl KbInner {
    fn insert(&mut self, fragment: Fragment, embedding: Vec<f32>) {
        self.index.insert(fragment.id, embedding);
        self.fragments.insert(fragment.id, fragment);
    }
}

/// Named persistent collection of fragments and their embeddings.
pub struct KnowledgeBase {
    name: String,
    db: Mutex<Connection>,
    inner: RwLock<KbInner>,
    embedder: Arc<dyn DynEmbeddingService>,
    generation: AtomicU64,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl KnowledgeBase {
    /// Open (or create) a knowledge base stored at the given path.
    ///
    /// Existing fragments for the collection are loaded into the in-memory
    /// index. Stored embeddings must match the embedder's dimensionality.
    pub fn open(
        path: &Path,
        name: impl Into<String>,
        embedder: Arc<dyn DynEmbeddingService>,
    ) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| IndexError::Storage(format!("create data dir: {}", e)))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| IndexError::Storage(format!("open database: {}", e)))?;
        info!("Knowledge base opened at {}", path.display());
        Self::from_connection(conn, name, embedder)
    }

    /// Open an in-memory knowledge base (for testing).
    pub fn in_memory(
        name: impl Into<String>,
        embedder: Arc<dyn DynEmbeddingService>,
    ) -> Result<Self, IndexError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| IndexError::Storage(format!("open in-memory db: {}", e)))?;
        Self::from_connection(conn, name, embedder)
    }

    fn from_connection(
        conn: Connection,
        name: impl Into<String>,
        embedder: Arc<dyn DynEmbeddingService>,
    ) -> Result<Self, IndexError> {
        let name = name.into();
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS fragments (
                 id         TEXT PRIMARY KEY,
                 collection TEXT NOT NULL,
                 source     TEXT NOT NULL,
                 position   INTEGER NOT NULL,
                 text       TEXT NOT NULL,
                 embedding  TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_fragments_collection
                 ON fragments(collection);",
        )
        .map_err(|e| IndexError::Storage(format!("init schema: {}", e)))?;

        let kb = Self {
            name,
            db: Mutex::new(conn),
            inner: RwLock::new(KbInner::default()),
            embedder,
            generation: AtomicU64::new(0),
        };
        kb.load()?;
        Ok(kb)
    }

    /// Load the collection's stored fragments into the in-memory index.
    fn load(&self) -> Result<(), IndexError> {
        let conn = self.lock_db()?;
        let mut stmt = conn.prepare(
            "SELECT id, source, position, text, embedding
             FROM fragments WHERE collection = ?1",
        )?;

        let mut inner = KbInner::default();
        let rows = stmt.query_map(params![self.name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        for row in rows {
            let (id, source, position, text, embedding_json) = row?;
            let id = Uuid::parse_str(&id)
                .map_err(|e| IndexError::Storage(format!("corrupt fragment id: {}", e)))?;
            let embedding: Vec<f32> = serde_json::from_str(&embedding_json)
                .map_err(|e| IndexError::Storage(format!("corrupt embedding: {}", e)))?;
            let expected = self.embedder.dimensions();
            if embedding.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    got: embedding.len(),
                });
            }
            inner.insert(
                Fragment {
                    id,
                    source,
                    position: position as usize,
                    text,
                },
                embedding,
            );
        }
        drop(stmt);
        drop(conn);

        let count = inner.fragments.len();
        *self.write_inner()? = inner;
        debug!(collection = %self.name, fragments = count, "Knowledge base loaded");
        Ok(())
    }

    /// Flush the collection and ingest the given fragments as a fresh
    /// generation. Delete and insert run in one transaction.
    pub async fn recreate(&self, fragments: Vec<Fragment>) -> Result<usize, IndexError> {
        let embedded = self.embed_all(fragments).await?;

        {
            let mut conn = self.lock_db()?;
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM fragments WHERE collection = ?1",
                params![self.name],
            )?;
            for (fragment, embedding) in &embedded {
                Self::insert_row(&tx, &self.name, fragment, embedding)?;
            }
            tx.commit()?;
        }

        let mut inner = KbInner::default();
        for (fragment, embedding) in embedded {
            inner.insert(fragment, embedding);
        }
        let count = inner.fragments.len();
        *self.write_inner()? = inner;
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!(collection = %self.name, fragments = count, "Knowledge base recreated");
        Ok(count)
    }

    /// Append fragments to the existing collection in one transaction.
    pub async fn append(&self, fragments: Vec<Fragment>) -> Result<usize, IndexError> {
        let embedded = self.embed_all(fragments).await?;

        {
            let mut conn = self.lock_db()?;
            let tx = conn.transaction()?;
            for (fragment, embedding) in &embedded {
                Self::insert_row(&tx, &self.name, fragment, embedding)?;
            }
            tx.commit()?;
        }

        let count = embedded.len();
        {
            let mut inner = self.write_inner()?;
            for (fragment, embedding) in embedded {
                inner.insert(fragment, embedding);
            }
        }
        info!(collection = %self.name, appended = count, "Knowledge base updated");
        Ok(count)
    }

    /// Nearest-neighbor query: embed the text and return the top-k fragments
    /// by cosine similarity.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredFragment>, IndexError> {
        let query_vec = self.embedder.embed_boxed(text).await?;

        let inner = self.read_inner()?;
        let hits = inner.index.search(&query_vec, k);
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                inner.fragments.get(&hit.id).map(|fragment| ScoredFragment {
                    fragment: fragment.clone(),
                    score: hit.score,
                })
            })
            .collect())
    }

    /// Draw a uniform random sample (without replacement) of at most `count`
    /// fragments. Never returns more fragments than exist.
    pub fn sample(&self, count: usize) -> Result<Vec<Fragment>, IndexError> {
        let inner = self.read_inner()?;
        let mut ordered: Vec<&Fragment> = inner.fragments.values().collect();
        ordered.sort_by(|a, b| {
            (&a.source, a.position, a.id).cmp(&(&b.source, b.position, b.id))
        });

        let amount = count.min(ordered.len());
        let mut rng = rand::rng();
        let chosen = rand::seq::index::sample(&mut rng, ordered.len(), amount);
        Ok(chosen.iter().map(|i| ordered[i].clone()).collect())
    }

    /// Every fragment in the collection, ordered by (source, position).
    pub fn all_fragments(&self) -> Result<Vec<Fragment>, IndexError> {
        let inner = self.read_inner()?;
        let mut fragments: Vec<Fragment> = inner.fragments.values().cloned().collect();
        fragments.sort_by(|a, b| {
            (&a.source, a.position, a.id).cmp(&(&b.source, b.position, b.id))
        });
        Ok(fragments)
    }

    /// The stored embedding of a fragment, if present.
    pub fn embedding(&self, id: Uuid) -> Result<Option<Vec<f32>>, IndexError> {
        let inner = self.read_inner()?;
        Ok(inner.index.embedding(id).map(|e| e.to_vec()))
    }

    /// Number of fragments in the collection.
    pub fn len(&self) -> usize {
        self.read_inner().map(|i| i.fragments.len()).unwrap_or(0)
    }

    /// True if the collection holds no fragments.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Generation counter, bumped on every recreate.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    // -- Private helpers --

    async fn embed_all(
        &self,
        fragments: Vec<Fragment>,
    ) -> Result<Vec<(Fragment, Vec<f32>)>, IndexError> {
        let mut embedded = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            let embedding = self.embedder.embed_boxed(&fragment.text).await?;
            embedded.push((fragment, embedding));
        }
        Ok(embedded)
    }

    fn insert_row(
        tx: &rusqlite::Transaction<'_>,
        collection: &str,
        fragment: &Fragment,
        embedding: &[f32],
    ) -> Result<(), IndexError> {
        let embedding_json = serde_json::to_string(embedding)
            .map_err(|e| IndexError::Storage(format!("serialize embedding: {}", e)))?;
        tx.execute(
            "INSERT OR REPLACE INTO fragments
             (id, collection, source, position, text, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                fragment.id.to_string(),
                collection,
                fragment.source,
                fragment.position as i64,
                fragment.text,
                embedding_json,
            ],
        )?;
        Ok(())
    }

    fn lock_db(&self) -> Result<std::sync::MutexGuard<'_, Connection>, IndexError> {
        self.db
            .lock()
            .map_err(|e| IndexError::Storage(format!("db lock poisoned: {}", e)))
    }

    fn read_inner(&self) -> Result<std::sync::RwLockReadGuard<'_, KbInner>, IndexError> {
        self.inner
            .read()
            .map_err(|e| IndexError::Storage(format!("index lock poisoned: {}", e)))
    }

    fn write_inner(&self) -> Result<std::sync::RwLockWriteGuard<'_, KbInner>, IndexError> {
        self.inner
            .write()
            .map_err(|e| IndexError::Storage(format!("index lock poisoned: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedding;

    fn kb() -> KnowledgeBase {
        KnowledgeBase::in_memory("test_kb", Arc::new(HashEmbedding::default())).unwrap()
    }

    fn fragments(texts: &[&str]) -> Vec<Fragment> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Fragment::new("doc.md", i, *t))
            .collect()
    }

    // ---- Basic lifecycle ----

    #[tokio::test]
    async fn test_new_kb_is_empty() {
        let kb = kb();
        assert!(kb.is_empty());
        assert_eq!(kb.len(), 0);
        assert_eq!(kb.generation(), 0);
        assert_eq!(kb.name(), "test_kb");
    }

    #[tokio::test]
    async fn test_recreate_ingests_fragments() {
        let kb = kb();
        let n = kb
            .recreate(fragments(&["alpha text here", "beta text here"]))
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(kb.len(), 2);
        assert_eq!(kb.generation(), 1);
    }

    #[tokio::test]
    async fn test_recreate_flushes_prior_content() {
        let kb = kb();
        kb.recreate(fragments(&["old fragment one", "old fragment two"]))
            .await
            .unwrap();
        kb.recreate(fragments(&["entirely new content"]))
            .await
            .unwrap();

        assert_eq!(kb.len(), 1);
        assert_eq!(kb.generation(), 2);
        let all = kb.all_fragments().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].text, "entirely new content");
    }

    #[tokio::test]
    async fn test_recreate_with_empty_set_flushes() {
        let kb = kb();
        kb.recreate(fragments(&["something here"])).await.unwrap();
        let n = kb.recreate(vec![]).await.unwrap();
        assert_eq!(n, 0);
        assert!(kb.is_empty());
    }

    #[tokio::test]
    async fn test_append_accumulates() {
        let kb = kb();
        kb.recreate(fragments(&["first batch text"])).await.unwrap();
        kb.append(vec![Fragment::new("other.md", 0, "second batch text")])
            .await
            .unwrap();

        assert_eq!(kb.len(), 2);
        // Append does not bump the generation.
        assert_eq!(kb.generation(), 1);
    }

    // ---- Query ----

    #[tokio::test]
    async fn test_query_returns_most_relevant_first() {
        let kb = kb();
        kb.recreate(fragments(&[
            "the authentication system issues refresh tokens on login",
            "tomato plants need watering twice a week in summer",
            "session tokens expire after the authentication timeout",
        ]))
        .await
        .unwrap();

        let results = kb
            .query("how does authentication with tokens work", 5)
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert!(
            results[0].fragment.text.contains("authentication"),
            "top hit was: {}",
            results[0].fragment.text
        );
    }

    #[tokio::test]
    async fn test_query_respects_k() {
        let kb = kb();
        let texts: Vec<String> = (0..30)
            .map(|i| format!("fragment number {} about shared topic words", i))
            .collect();
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        kb.recreate(fragments(&refs)).await.unwrap();

        for k in [5usize, 10, 20] {
            let results = kb.query("shared topic words", k).await.unwrap();
            assert!(results.len() <= k);
        }
    }

    #[tokio::test]
    async fn test_query_empty_kb_returns_no_results() {
        let kb = kb();
        let results = kb.query("anything at all", 10).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_query_empty_text_is_error() {
        let kb = kb();
        assert!(kb.query("", 10).await.is_err());
    }

    // ---- Sampling and enumeration ----

    #[tokio::test]
    async fn test_sample_bounded_by_len() {
        let kb = kb();
        kb.recreate(fragments(&["one thing", "two things", "three things"]))
            .await
            .unwrap();

        let sample = kb.sample(100).unwrap();
        assert_eq!(sample.len(), 3);

        let sample = kb.sample(2).unwrap();
        assert_eq!(sample.len(), 2);
    }

    #[tokio::test]
    async fn test_sample_without_replacement() {
        let kb = kb();
        let texts: Vec<String> = (0..20).map(|i| format!("unique fragment {}", i)).collect();
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        kb.recreate(fragments(&refs)).await.unwrap();

        let sample = kb.sample(20).unwrap();
        let mut ids: Vec<Uuid> = sample.iter().map(|f| f.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);
    }

    #[tokio::test]
    async fn test_sample_empty_kb() {
        let kb = kb();
        assert!(kb.sample(5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_all_fragments_ordered_by_source_position() {
        let kb = kb();
        kb.recreate(vec![
            Fragment::new("b.md", 1, "b one"),
            Fragment::new("a.md", 0, "a zero"),
            Fragment::new("b.md", 0, "b zero"),
        ])
        .await
        .unwrap();

        let all = kb.all_fragments().unwrap();
        let order: Vec<(&str, usize)> = all
            .iter()
            .map(|f| (f.source.as_str(), f.position))
            .collect();
        assert_eq!(order, vec![("a.md", 0), ("b.md", 0), ("b.md", 1)]);
    }

    #[tokio::test]
    async fn test_embedding_lookup() {
        let kb = kb();
        kb.recreate(fragments(&["some stored text"])).await.unwrap();
        let frag = &kb.all_fragments().unwrap()[0];

        let embedding = kb.embedding(frag.id).unwrap().unwrap();
        assert_eq!(embedding.len(), 256);
        assert!(kb.embedding(Uuid::new_v4()).unwrap().is_none());
    }

    // ---- Persistence ----

    #[tokio::test]
    async fn test_reopen_preserves_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.db");
        let embedder: Arc<dyn DynEmbeddingService> = Arc::new(HashEmbedding::default());

        {
            let kb = KnowledgeBase::open(&path, "persist_kb", embedder.clone()).unwrap();
            kb.recreate(fragments(&["survives restart", "also survives"]))
                .await
                .unwrap();
        }

        let kb = KnowledgeBase::open(&path, "persist_kb", embedder).unwrap();
        assert_eq!(kb.len(), 2);
        let results = kb.query("survives restart", 5).await.unwrap();
        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.db");
        let embedder: Arc<dyn DynEmbeddingService> = Arc::new(HashEmbedding::default());

        {
            let kb = KnowledgeBase::open(&path, "first", embedder.clone()).unwrap();
            kb.recreate(fragments(&["belongs to first"])).await.unwrap();
        }

        let kb = KnowledgeBase::open(&path, "second", embedder).unwrap();
        assert!(kb.is_empty());
    }

    #[tokio::test]
    async fn test_reopen_dimension_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.db");

        {
            let embedder: Arc<dyn DynEmbeddingService> = Arc::new(HashEmbedding::new(64));
            let kb = KnowledgeBase::open(&path, "kb", embedder).unwrap();
            kb.recreate(fragments(&["stored at 64 dims"])).await.unwrap();
        }

        let embedder: Arc<dyn DynEmbeddingService> = Arc::new(HashEmbedding::new(128));
        let result = KnowledgeBase::open(&path, "kb", embedder);
        assert!(matches!(
            result.unwrap_err(),
            IndexError::DimensionMismatch { expected: 128, got: 64 }
        ));
    }

    // ---- Consistency under recreate ----

    #[tokio::test]
    async fn test_reader_never_sees_mixed_generations() {
        let kb = Arc::new(kb());
        kb.recreate(fragments(&["old alpha", "old beta", "old gamma"]))
            .await
            .unwrap();

        // After recreate completes, every visible fragment must belong to
        // the new generation.
        kb.recreate(fragments(&["new delta", "new epsilon"]))
            .await
            .unwrap();
        let all = kb.all_fragments().unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|f| f.text.starts_with("new")));
    }
}
