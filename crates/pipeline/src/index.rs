//! SQLite-backed semantic index over chunk embeddings.
//!
//! Vectors are stored as little-endian f32 blobs next to the chunk
//! metadata; search is a full scan with cosine similarity, which is fast
//! enough for corpora of a few thousand chunks. Every search opens its own
//! read connection, so concurrent questions see a consistent snapshot and
//! a rebuild can swap the database file underneath them atomically.

use crate::types::{ChunkRecord, IndexStats};
use coverqa_core::{AppError, AppResult};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};

/// A chunk paired with its embedding, ready for upsert.
pub type EmbeddedChunk = (ChunkRecord, Vec<f32>);

/// Persistent vector index.
pub struct SemanticIndex {
    db_path: PathBuf,
    dimension: usize,
    rebuild_guard: Mutex<()>,
}

impl SemanticIndex {
    /// Open (creating if needed) the index at `db_path`.
    pub fn open(db_path: impl Into<PathBuf>, dimension: usize) -> AppResult<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let index = Self {
            db_path,
            dimension,
            rebuild_guard: Mutex::new(()),
        };

        let conn = index.connect(&index.db_path)?;
        init_schema(&conn)?;
        tracing::debug!("Opened semantic index at {:?}", index.db_path);
        Ok(index)
    }

    /// Embedding dimension this index was opened with.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn connect(&self, path: &Path) -> AppResult<Connection> {
        Connection::open(path)
            .map_err(|e| AppError::Index(format!("Failed to open index database: {}", e)))
    }

    /// Insert or replace a batch of embedded chunks in one transaction.
    pub fn upsert(&self, records: &[EmbeddedChunk]) -> AppResult<usize> {
        let mut conn = self.connect(&self.db_path)?;
        upsert_into(&mut conn, records, self.dimension)
    }

    /// Top-k most similar chunks above the similarity floor.
    ///
    /// An empty or missing index yields an empty result set, not an error.
    /// Ties are broken by document id then chunk position so rankings are
    /// deterministic across runs.
    pub fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        min_similarity: f32,
    ) -> AppResult<Vec<(ChunkRecord, f32)>> {
        if query_vector.len() != self.dimension {
            return Err(AppError::Index(format!(
                "Query vector has dimension {}, index expects {}",
                query_vector.len(),
                self.dimension
            )));
        }

        let conn = self.connect(&self.db_path)?;

        let mut stmt = conn
            .prepare(
                "SELECT chunk_id, document_id, filename, page_start, page_end,
                        section, text, token_count, position, embedding
                 FROM chunks",
            )
            .map_err(|e| AppError::Index(format!("Failed to prepare search: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let embedding_bytes: Vec<u8> = row.get(9)?;
                Ok((
                    ChunkRecord {
                        chunk_id: row.get(0)?,
                        document_id: row.get(1)?,
                        filename: row.get(2)?,
                        page_start: row.get::<_, i64>(3)? as u32,
                        page_end: row.get::<_, i64>(4)? as u32,
                        section: row.get(5)?,
                        text: row.get(6)?,
                        token_count: row.get::<_, i64>(7)? as usize,
                        position: row.get::<_, i64>(8)? as u32,
                    },
                    embedding_bytes,
                ))
            })
            .map_err(|e| AppError::Index(format!("Failed to query chunks: {}", e)))?;

        let mut results: Vec<(ChunkRecord, f32)> = Vec::new();
        for row in rows {
            let (chunk, bytes) =
                row.map_err(|e| AppError::Index(format!("Failed to read chunk row: {}", e)))?;
            let embedding = bytes_to_embedding(&bytes)?;
            let score = cosine_similarity(query_vector, &embedding);
            if score >= min_similarity {
                results.push((chunk, score));
            }
        }

        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.document_id.cmp(&b.0.document_id))
                .then_with(|| a.0.position.cmp(&b.0.position))
        });
        results.truncate(k);

        tracing::debug!("Search returned {} chunks (top-{})", results.len(), k);
        Ok(results)
    }

    /// Document and chunk counts plus the configured dimension.
    pub fn stats(&self) -> AppResult<IndexStats> {
        let conn = self.connect(&self.db_path)?;

        let chunks: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(|e| AppError::Index(format!("Failed to count chunks: {}", e)))?;

        let documents: i64 = conn
            .query_row(
                "SELECT COUNT(DISTINCT document_id) FROM chunks",
                [],
                |row| row.get(0),
            )
            .map_err(|e| AppError::Index(format!("Failed to count documents: {}", e)))?;

        Ok(IndexStats {
            documents: documents as u64,
            chunks: chunks as u64,
            dimension: self.dimension,
        })
    }

    /// Delete all indexed chunks.
    pub fn reset(&self) -> AppResult<()> {
        let conn = self.connect(&self.db_path)?;
        conn.execute("DELETE FROM chunks", [])
            .map_err(|e| AppError::Index(format!("Failed to reset index: {}", e)))?;
        tracing::info!("Reset semantic index");
        Ok(())
    }

    /// Start an atomic rebuild.
    ///
    /// Chunks are written to a staging database; existing readers keep
    /// querying the old file until [`RebuildHandle::commit`] renames the
    /// staging file over it. At most one rebuild may be in flight; a
    /// second concurrent attempt fails fast instead of queueing.
    pub fn begin_rebuild(&self) -> AppResult<RebuildHandle<'_>> {
        let guard = self
            .rebuild_guard
            .try_lock()
            .map_err(|_| AppError::Index("Index rebuild already in progress".to_string()))?;

        let staging_path = self.db_path.with_extension("rebuild");
        // Stale staging file from a crashed rebuild
        if staging_path.exists() {
            std::fs::remove_file(&staging_path)?;
        }

        let conn = self.connect(&staging_path)?;
        init_schema(&conn)?;
        drop(conn);

        tracing::info!("Started index rebuild (staging at {:?})", staging_path);
        Ok(RebuildHandle {
            index: self,
            staging_path,
            _guard: guard,
        })
    }
}

/// An in-flight index rebuild. Dropping without committing discards the
/// staging data and leaves the live index untouched.
pub struct RebuildHandle<'a> {
    index: &'a SemanticIndex,
    staging_path: PathBuf,
    _guard: MutexGuard<'a, ()>,
}

impl RebuildHandle<'_> {
    /// Add embedded chunks to the staging index.
    pub fn upsert(&self, records: &[EmbeddedChunk]) -> AppResult<usize> {
        let mut conn = self.index.connect(&self.staging_path)?;
        upsert_into(&mut conn, records, self.index.dimension)
    }

    /// Atomically swap the staging index in as the live index.
    pub fn commit(self) -> AppResult<()> {
        std::fs::rename(&self.staging_path, &self.index.db_path)?;
        tracing::info!("Index rebuild committed");
        Ok(())
    }
}

impl Drop for RebuildHandle<'_> {
    fn drop(&mut self) {
        if self.staging_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.staging_path) {
                tracing::warn!("Failed to remove staging index: {}", e);
            }
        }
    }
}

fn init_schema(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            chunk_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            filename TEXT NOT NULL,
            page_start INTEGER NOT NULL,
            page_end INTEGER NOT NULL,
            section TEXT NOT NULL,
            text TEXT NOT NULL,
            token_count INTEGER NOT NULL,
            position INTEGER NOT NULL,
            embedding BLOB NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
        "#,
    )
    .map_err(|e| AppError::Index(format!("Failed to create tables: {}", e)))
}

fn upsert_into(
    conn: &mut Connection,
    records: &[EmbeddedChunk],
    dimension: usize,
) -> AppResult<usize> {
    let tx = conn
        .transaction()
        .map_err(|e| AppError::Index(format!("Failed to start transaction: {}", e)))?;

    for (chunk, embedding) in records {
        if embedding.len() != dimension {
            return Err(AppError::Index(format!(
                "Chunk '{}' has embedding dimension {}, index expects {}",
                chunk.chunk_id,
                embedding.len(),
                dimension
            )));
        }

        tx.execute(
            "INSERT OR REPLACE INTO chunks
                 (chunk_id, document_id, filename, page_start, page_end,
                  section, text, token_count, position, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                chunk.chunk_id,
                chunk.document_id,
                chunk.filename,
                chunk.page_start as i64,
                chunk.page_end as i64,
                chunk.section,
                chunk.text,
                chunk.token_count as i64,
                chunk.position as i64,
                embedding_to_bytes(embedding),
            ],
        )
        .map_err(|e| AppError::Index(format!("Failed to insert chunk: {}", e)))?;
    }

    tx.commit()
        .map_err(|e| AppError::Index(format!("Failed to commit upsert: {}", e)))?;

    tracing::debug!("Upserted {} chunk(s)", records.len());
    Ok(records.len())
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Index(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    let mut embedding = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        embedding.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(embedding)
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, doc: &str, position: u32, text: &str) -> ChunkRecord {
        ChunkRecord {
            chunk_id: id.to_string(),
            document_id: doc.to_string(),
            filename: format!("{}.pdf", doc),
            page_start: 1,
            page_end: 1,
            section: "Benefits".to_string(),
            text: text.to_string(),
            token_count: 10,
            position,
        }
    }

    fn open_index(dir: &tempfile::TempDir) -> SemanticIndex {
        SemanticIndex::open(dir.path().join("index.db"), 3).unwrap()
    }

    #[test]
    fn test_empty_index_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(&dir);
        let results = index.search(&[1.0, 0.0, 0.0], 5, 0.0).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_upsert_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(&dir);

        index
            .upsert(&[
                (chunk("a", "doc1", 0, "knee surgery"), vec![1.0, 0.0, 0.0]),
                (chunk("b", "doc1", 1, "dental care"), vec![0.0, 1.0, 0.0]),
            ])
            .unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 5, 0.0).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.chunk_id, "a");
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn test_upsert_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(&dir);

        index
            .upsert(&[(chunk("a", "doc1", 0, "old"), vec![1.0, 0.0, 0.0])])
            .unwrap();
        index
            .upsert(&[(chunk("a", "doc1", 0, "new"), vec![1.0, 0.0, 0.0])])
            .unwrap();

        let stats = index.stats().unwrap();
        assert_eq!(stats.chunks, 1);

        let results = index.search(&[1.0, 0.0, 0.0], 1, 0.0).unwrap();
        assert_eq!(results[0].0.text, "new");
    }

    #[test]
    fn test_similarity_floor() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(&dir);

        index
            .upsert(&[
                (chunk("a", "doc1", 0, "on topic"), vec![1.0, 0.0, 0.0]),
                (chunk("b", "doc1", 1, "orthogonal"), vec![0.0, 1.0, 0.0]),
            ])
            .unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 5, 0.5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.chunk_id, "a");
    }

    #[test]
    fn test_tie_break_by_position() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(&dir);

        // Identical vectors, different positions
        index
            .upsert(&[
                (chunk("late", "doc1", 5, "text"), vec![1.0, 0.0, 0.0]),
                (chunk("early", "doc1", 2, "text"), vec![1.0, 0.0, 0.0]),
            ])
            .unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 5, 0.0).unwrap();
        assert_eq!(results[0].0.chunk_id, "early");
    }

    #[test]
    fn test_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(&dir);

        assert!(index.search(&[1.0, 0.0], 5, 0.0).is_err());
        assert!(index
            .upsert(&[(chunk("a", "doc1", 0, "text"), vec![1.0, 0.0])])
            .is_err());
    }

    #[test]
    fn test_reset() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(&dir);

        index
            .upsert(&[(chunk("a", "doc1", 0, "text"), vec![1.0, 0.0, 0.0])])
            .unwrap();
        index.reset().unwrap();
        assert_eq!(index.stats().unwrap().chunks, 0);
    }

    #[tokio::test]
    async fn test_rebuild_swaps_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(&dir);

        index
            .upsert(&[(chunk("old", "doc1", 0, "old corpus"), vec![1.0, 0.0, 0.0])])
            .unwrap();

        let rebuild = index.begin_rebuild().unwrap();
        rebuild
            .upsert(&[(chunk("new", "doc2", 0, "new corpus"), vec![0.0, 1.0, 0.0])])
            .unwrap();

        // Old index still serves reads while the rebuild is staged
        let results = index.search(&[1.0, 0.0, 0.0], 5, 0.0).unwrap();
        assert_eq!(results[0].0.chunk_id, "old");

        rebuild.commit().unwrap();

        let results = index.search(&[0.0, 1.0, 0.0], 5, 0.0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.chunk_id, "new");
    }

    #[tokio::test]
    async fn test_concurrent_rebuild_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(&dir);

        let first = index.begin_rebuild().unwrap();
        assert!(index.begin_rebuild().is_err());
        drop(first);

        // Guard released, staging cleaned up
        assert!(index.begin_rebuild().is_ok());
    }
}
