//! Durable keyed storage: one SQLite file holds chunks, vectors, file state,
//! and key-value metadata.
//!
//! The full-text side of hybrid search is an FTS5 external-content table
//! kept consistent with the chunk table by triggers, so every chunk write
//! path (insert, update, delete) maintains the text index automatically.
//! The vector side stores embeddings as little-endian f32 blobs and scores
//! them by brute-force dot product; with L2-normalized vectors that is
//! cosine similarity, and corpora of this size don't need an ANN index.

use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::errors::{EmberError, Result};
use crate::types::{Chunk, FileState};

/// Bump when the schema changes shape. Stored in `meta` under
/// `schema_version` and checked at open.
const SCHEMA_VERSION: &str = "1";

/// Optional narrowing applied to both retrieval signals.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Glob over the repo-relative chunk path.
    pub path_glob: Option<String>,
    /// Exact semantic language code.
    pub lang: Option<String>,
}

/// A text-index hit: chunk id plus its BM25 rank value (lower is better).
#[derive(Debug, Clone, PartialEq)]
pub struct TextHit {
    pub chunk_id: String,
    pub bm25: f64,
}

/// A vector-index hit: chunk id plus cosine similarity (higher is better).
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: String,
    pub similarity: f32,
}

#[derive(Debug)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the index database at `path` and verify the
    /// schema version.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        let store = Self { conn };
        store.init_schema()?;
        store.check_schema_version()?;
        Ok(store)
    }

    /// In-memory store for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        store.check_schema_version()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chunks (
                id           TEXT PRIMARY KEY,
                path         TEXT NOT NULL,
                lang         TEXT NOT NULL,
                symbol       TEXT,
                start_line   INTEGER NOT NULL,
                end_line     INTEGER NOT NULL,
                content      TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                file_hash    TEXT NOT NULL,
                tree_sha     TEXT NOT NULL,
                rev          TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path);
            CREATE INDEX IF NOT EXISTS idx_chunks_content_hash ON chunks(content_hash);

            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                content, symbol, path,
                content='chunks', content_rowid='rowid'
            );

            CREATE TRIGGER IF NOT EXISTS chunks_fts_ai AFTER INSERT ON chunks BEGIN
                INSERT INTO chunks_fts(rowid, content, symbol, path)
                VALUES (new.rowid, new.content, new.symbol, new.path);
            END;
            CREATE TRIGGER IF NOT EXISTS chunks_fts_ad AFTER DELETE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, content, symbol, path)
                VALUES ('delete', old.rowid, old.content, old.symbol, old.path);
            END;
            CREATE TRIGGER IF NOT EXISTS chunks_fts_au AFTER UPDATE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, content, symbol, path)
                VALUES ('delete', old.rowid, old.content, old.symbol, old.path);
                INSERT INTO chunks_fts(rowid, content, symbol, path)
                VALUES (new.rowid, new.content, new.symbol, new.path);
            END;

            CREATE TABLE IF NOT EXISTS vectors (
                chunk_id          TEXT PRIMARY KEY,
                embedding         BLOB NOT NULL,
                model_fingerprint TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS files (
                path      TEXT PRIMARY KEY,
                file_hash TEXT NOT NULL,
                size      INTEGER NOT NULL,
                mtime     INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn check_schema_version(&self) -> Result<()> {
        match self.meta_get("schema_version")? {
            None => self.meta_set("schema_version", SCHEMA_VERSION),
            Some(v) if v == SCHEMA_VERSION => Ok(()),
            Some(v) => Err(EmberError::Database(format!(
                "index schema is v{v}, this build expects v{SCHEMA_VERSION}"
            ))),
        }
    }

    // ── Chunks ────────────────────────────────────────────────────────────

    /// Upsert by id. Idempotent: re-adding an identical chunk is a no-op in
    /// effect, and the FTS triggers keep the text index in step either way.
    pub fn add_chunk(&self, chunk: &Chunk) -> Result<()> {
        self.conn.execute(
            "INSERT INTO chunks
                 (id, path, lang, symbol, start_line, end_line, content,
                  content_hash, file_hash, tree_sha, rev)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                 path = excluded.path,
                 lang = excluded.lang,
                 symbol = excluded.symbol,
                 start_line = excluded.start_line,
                 end_line = excluded.end_line,
                 content = excluded.content,
                 content_hash = excluded.content_hash,
                 file_hash = excluded.file_hash,
                 tree_sha = excluded.tree_sha,
                 rev = excluded.rev",
            params![
                chunk.id,
                chunk.path,
                chunk.lang,
                chunk.symbol,
                chunk.start_line,
                chunk.end_line,
                chunk.content,
                chunk.content_hash,
                chunk.file_hash,
                chunk.tree_sha,
                chunk.rev,
            ],
        )?;
        Ok(())
    }

    pub fn get_chunk(&self, id: &str) -> Result<Option<Chunk>> {
        self.conn
            .query_row(
                &format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id = ?1"),
                params![id],
                row_to_chunk,
            )
            .optional()
            .map_err(EmberError::from)
    }

    /// All chunks whose content hash matches, across paths.
    pub fn find_by_content_hash(&self, content_hash: &str) -> Result<Vec<Chunk>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks WHERE content_hash = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![content_hash], row_to_chunk)?;
        collect_chunks(rows)
    }

    /// Every chunk whose id starts with the given hex prefix.
    pub fn find_by_id_prefix(&self, prefix: &str) -> Result<Vec<Chunk>> {
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks WHERE id LIKE ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![format!("{}%", prefix.to_lowercase())], row_to_chunk)?;
        collect_chunks(rows)
    }

    /// Deleting a missing id is a no-op, which keeps rollback idempotent.
    pub fn delete_chunk(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM chunks WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Remove every chunk (and its vector) for a path. Returns how many
    /// chunks were deleted.
    pub fn delete_all_for_path(&self, path: &str) -> Result<usize> {
        self.conn.execute(
            "DELETE FROM vectors WHERE chunk_id IN (SELECT id FROM chunks WHERE path = ?1)",
            params![path],
        )?;
        let deleted = self
            .conn
            .execute("DELETE FROM chunks WHERE path = ?1", params![path])?;
        Ok(deleted)
    }

    pub fn count_chunks(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn count_unique_files(&self) -> Result<usize> {
        let n: i64 =
            self.conn
                .query_row("SELECT COUNT(DISTINCT path) FROM chunks", [], |row| {
                    row.get(0)
                })?;
        Ok(n as usize)
    }

    pub fn list_chunks(&self, filters: &SearchFilters) -> Result<Vec<Chunk>> {
        let mut sql = format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE 1=1");
        let mut bind: Vec<Value> = Vec::new();
        if let Some(glob) = &filters.path_glob {
            sql.push_str(" AND path GLOB ?");
            bind.push(Value::Text(glob.clone()));
        }
        if let Some(lang) = &filters.lang {
            sql.push_str(" AND lang = ?");
            bind.push(Value::Text(lang.clone()));
        }
        sql.push_str(" ORDER BY path, start_line, id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind), row_to_chunk)?;
        collect_chunks(rows)
    }

    // ── Vectors ───────────────────────────────────────────────────────────

    pub fn add_vector(
        &self,
        chunk_id: &str,
        embedding: &[f32],
        model_fingerprint: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO vectors (chunk_id, embedding, model_fingerprint)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(chunk_id) DO UPDATE SET
                 embedding = excluded.embedding,
                 model_fingerprint = excluded.model_fingerprint",
            params![chunk_id, encode_embedding(embedding), model_fingerprint],
        )?;
        Ok(())
    }

    pub fn get_vector(&self, chunk_id: &str) -> Result<Option<(Vec<f32>, String)>> {
        self.conn
            .query_row(
                "SELECT embedding, model_fingerprint FROM vectors WHERE chunk_id = ?1",
                params![chunk_id],
                |row| {
                    let blob: Vec<u8> = row.get(0)?;
                    let fingerprint: String = row.get(1)?;
                    Ok((decode_embedding(&blob), fingerprint))
                },
            )
            .optional()
            .map_err(EmberError::from)
    }

    pub fn delete_vector(&self, chunk_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM vectors WHERE chunk_id = ?1", params![chunk_id])?;
        Ok(())
    }

    pub fn count_vectors(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Ids of vectors with no matching chunk and vice versa. Both empty at
    /// every sync completion; exposed for the parity check in tests and
    /// `status` diagnostics.
    pub fn orphaned_ids(&self) -> Result<(Vec<String>, Vec<String>)> {
        let mut stmt = self.conn.prepare(
            "SELECT chunk_id FROM vectors WHERE chunk_id NOT IN (SELECT id FROM chunks)",
        )?;
        let orphan_vectors = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut stmt = self.conn.prepare(
            "SELECT id FROM chunks WHERE id NOT IN (SELECT chunk_id FROM vectors)",
        )?;
        let chunks_without_vectors = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok((orphan_vectors, chunks_without_vectors))
    }

    // ── Metadata ──────────────────────────────────────────────────────────

    pub fn meta_get(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(EmberError::from)
    }

    pub fn meta_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn meta_delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM meta WHERE key = ?1", params![key])?;
        Ok(())
    }

    // ── File state ────────────────────────────────────────────────────────

    pub fn track_file(&self, path: &str, state: &FileState) -> Result<()> {
        self.conn.execute(
            "INSERT INTO files (path, file_hash, size, mtime) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET
                 file_hash = excluded.file_hash,
                 size = excluded.size,
                 mtime = excluded.mtime",
            params![path, state.file_hash, state.size as i64, state.mtime],
        )?;
        Ok(())
    }

    pub fn file_state(&self, path: &str) -> Result<Option<FileState>> {
        self.conn
            .query_row(
                "SELECT file_hash, size, mtime FROM files WHERE path = ?1",
                params![path],
                |row| {
                    Ok(FileState {
                        file_hash: row.get(0)?,
                        size: row.get::<_, i64>(1)? as u64,
                        mtime: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(EmberError::from)
    }

    pub fn untrack_file(&self, path: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM files WHERE path = ?1", params![path])?;
        Ok(())
    }

    pub fn all_tracked_files(&self) -> Result<Vec<PathBuf>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM files ORDER BY path")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut files = Vec::new();
        for row in rows {
            files.push(PathBuf::from(row?));
        }
        Ok(files)
    }

    // ── Retrieval primitives ──────────────────────────────────────────────

    /// BM25-ranked full-text hits, best first; ties by chunk id.
    pub fn text_search(
        &self,
        query_text: &str,
        topk: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<TextHit>> {
        let Some(match_expr) = build_match_expr(query_text) else {
            return Ok(Vec::new());
        };
        let mut sql = String::from(
            "SELECT c.id, bm25(chunks_fts) AS rank
             FROM chunks_fts
             JOIN chunks c ON c.rowid = chunks_fts.rowid
             WHERE chunks_fts MATCH ?",
        );
        let mut bind: Vec<Value> = vec![Value::Text(match_expr)];
        if let Some(glob) = &filters.path_glob {
            sql.push_str(" AND c.path GLOB ?");
            bind.push(Value::Text(glob.clone()));
        }
        if let Some(lang) = &filters.lang {
            sql.push_str(" AND c.lang = ?");
            bind.push(Value::Text(lang.clone()));
        }
        sql.push_str(" ORDER BY rank, c.id LIMIT ?");
        bind.push(Value::Integer(topk as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind), |row| {
            Ok(TextHit {
                chunk_id: row.get(0)?,
                bm25: row.get(1)?,
            })
        })?;
        let mut hits = Vec::new();
        for row in rows {
            hits.push(row?);
        }
        Ok(hits)
    }

    /// Cosine-ranked vector hits, best first; ties by chunk id. Vectors
    /// recorded under a different fingerprint (or with a stray dimension)
    /// are skipped rather than scored nonsensically.
    pub fn vector_search(
        &self,
        query_vector: &[f32],
        topk: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<VectorHit>> {
        let mut sql = String::from(
            "SELECT v.chunk_id, v.embedding
             FROM vectors v
             JOIN chunks c ON c.id = v.chunk_id
             WHERE 1=1",
        );
        let mut bind: Vec<Value> = Vec::new();
        if let Some(glob) = &filters.path_glob {
            sql.push_str(" AND c.path GLOB ?");
            bind.push(Value::Text(glob.clone()));
        }
        if let Some(lang) = &filters.lang {
            sql.push_str(" AND c.lang = ?");
            bind.push(Value::Text(lang.clone()));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind), |row| {
            let id: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((id, decode_embedding(&blob)))
        })?;

        let mut hits: Vec<VectorHit> = Vec::new();
        for row in rows {
            let (chunk_id, embedding) = row?;
            if embedding.len() != query_vector.len() {
                continue;
            }
            let similarity = dot(query_vector, &embedding);
            hits.push(VectorHit {
                chunk_id,
                similarity,
            });
        }
        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(topk);
        Ok(hits)
    }
}

#[cfg(test)]
impl Store {
    /// Run arbitrary SQL to sabotage the schema in failure-path tests.
    pub(crate) fn raw_execute_for_tests(&self, sql: &str) {
        self.conn.execute_batch(sql).unwrap();
    }
}

const CHUNK_COLUMNS: &str = "id, path, lang, symbol, start_line, end_line, content, \
                             content_hash, file_hash, tree_sha, rev";

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: row.get(0)?,
        path: row.get(1)?,
        lang: row.get(2)?,
        symbol: row.get(3)?,
        start_line: row.get(4)?,
        end_line: row.get(5)?,
        content: row.get(6)?,
        content_hash: row.get(7)?,
        file_hash: row.get(8)?,
        tree_sha: row.get(9)?,
        rev: row.get(10)?,
    })
}

fn collect_chunks(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<Chunk>>,
) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for row in rows {
        chunks.push(row?);
    }
    Ok(chunks)
}

/// Build an FTS5 MATCH expression from free text: each token quoted (so no
/// user input reaches the FTS query parser) and OR-joined. Returns `None`
/// when the text has no usable tokens.
fn build_match_expr(text: &str) -> Option<String> {
    let tokens: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(path: &str, start: u32, content: &str) -> Chunk {
        Chunk::new(
            "proj",
            path,
            "py",
            None,
            start,
            start + content.lines().count().max(1) as u32 - 1,
            content.to_string(),
            "filehash".to_string(),
            "tree".to_string(),
            "worktree".to_string(),
        )
    }

    #[test]
    fn upsert_is_idempotent_by_id() {
        let store = Store::open_in_memory().unwrap();
        let c = chunk("a.py", 1, "def foo(): pass");
        store.add_chunk(&c).unwrap();
        store.add_chunk(&c).unwrap();
        assert_eq!(store.count_chunks().unwrap(), 1);
        assert_eq!(store.get_chunk(&c.id).unwrap().unwrap(), c);
    }

    #[test]
    fn fts_index_tracks_chunk_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        let c = chunk("a.py", 1, "def compute_total():\n    return 1");
        store.add_chunk(&c).unwrap();

        let hits = store
            .text_search("compute_total", 10, &SearchFilters::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, c.id);

        store.delete_chunk(&c.id).unwrap();
        let hits = store
            .text_search("compute_total", 10, &SearchFilters::default())
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn content_hash_lookup_spans_paths() {
        let store = Store::open_in_memory().unwrap();
        let a = chunk("a.py", 1, "shared body");
        let b = chunk("b.py", 5, "shared body");
        store.add_chunk(&a).unwrap();
        store.add_chunk(&b).unwrap();

        let found = store.find_by_content_hash(&a.content_hash).unwrap();
        assert_eq!(found.len(), 2);
        assert!(store.find_by_content_hash("0".repeat(64).as_str()).unwrap().is_empty());
    }

    #[test]
    fn id_prefix_lookup() {
        let store = Store::open_in_memory().unwrap();
        let c = chunk("a.py", 1, "def foo(): pass");
        store.add_chunk(&c).unwrap();

        let found = store.find_by_id_prefix(&c.id[..6]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, c.id);

        // Non-hex prefixes can't match any id.
        assert!(store.find_by_id_prefix("not-hex!").unwrap().is_empty());
        assert!(store.find_by_id_prefix("").unwrap().is_empty());
    }

    #[test]
    fn delete_all_for_path_takes_vectors_along() {
        let store = Store::open_in_memory().unwrap();
        let a = chunk("a.py", 1, "alpha");
        let b = chunk("a.py", 10, "beta");
        let keep = chunk("z.py", 1, "gamma");
        for c in [&a, &b, &keep] {
            store.add_chunk(c).unwrap();
            store.add_vector(&c.id, &[0.5, 0.5], "m:v1").unwrap();
        }

        assert_eq!(store.delete_all_for_path("a.py").unwrap(), 2);
        assert_eq!(store.count_chunks().unwrap(), 1);
        assert_eq!(store.count_vectors().unwrap(), 1);
        assert!(store.get_vector(&a.id).unwrap().is_none());
        assert!(store.get_vector(&keep.id).unwrap().is_some());

        let (orphan_vectors, chunkless) = store.orphaned_ids().unwrap();
        assert!(orphan_vectors.is_empty());
        assert!(chunkless.is_empty());
    }

    #[test]
    fn vector_roundtrip_preserves_values() {
        let store = Store::open_in_memory().unwrap();
        let c = chunk("a.py", 1, "body");
        store.add_chunk(&c).unwrap();
        let embedding = vec![0.25f32, -1.5, 3.75, 0.0];
        store.add_vector(&c.id, &embedding, "model:v1:abcd").unwrap();

        let (read, fingerprint) = store.get_vector(&c.id).unwrap().unwrap();
        assert_eq!(read, embedding);
        assert_eq!(fingerprint, "model:v1:abcd");
    }

    #[test]
    fn vector_search_orders_by_similarity_then_id() {
        let store = Store::open_in_memory().unwrap();
        let near = chunk("near.py", 1, "near");
        let far = chunk("far.py", 1, "far");
        store.add_chunk(&near).unwrap();
        store.add_chunk(&far).unwrap();
        store.add_vector(&near.id, &[1.0, 0.0], "m").unwrap();
        store.add_vector(&far.id, &[0.0, 1.0], "m").unwrap();

        let hits = store
            .vector_search(&[1.0, 0.0], 10, &SearchFilters::default())
            .unwrap();
        assert_eq!(hits[0].chunk_id, near.id);
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[test]
    fn filters_narrow_both_signals() {
        let store = Store::open_in_memory().unwrap();
        let py = chunk("src/a.py", 1, "def handler(): pass");
        let mut rs = chunk("src/b.rs", 1, "fn handler() {}");
        rs.lang = "rs".into();
        store.add_chunk(&py).unwrap();
        store.add_chunk(&rs).unwrap();
        store.add_vector(&py.id, &[1.0, 0.0], "m").unwrap();
        store.add_vector(&rs.id, &[1.0, 0.0], "m").unwrap();

        let filters = SearchFilters {
            path_glob: None,
            lang: Some("rs".into()),
        };
        let text = store.text_search("handler", 10, &filters).unwrap();
        assert_eq!(text.len(), 1);
        assert_eq!(text[0].chunk_id, rs.id);

        let filters = SearchFilters {
            path_glob: Some("src/*.py".into()),
            lang: None,
        };
        let vecs = store.vector_search(&[1.0, 0.0], 10, &filters).unwrap();
        assert_eq!(vecs.len(), 1);
        assert_eq!(vecs[0].chunk_id, py.id);
    }

    #[test]
    fn meta_and_file_state_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.meta_get("last_tree_sha").unwrap().is_none());
        store.meta_set("last_tree_sha", "abc").unwrap();
        store.meta_set("last_tree_sha", "def").unwrap();
        assert_eq!(store.meta_get("last_tree_sha").unwrap().unwrap(), "def");
        store.meta_delete("last_tree_sha").unwrap();
        assert!(store.meta_get("last_tree_sha").unwrap().is_none());

        let state = FileState {
            file_hash: "h".into(),
            size: 42,
            mtime: 1_700_000_000,
        };
        store.track_file("a.py", &state).unwrap();
        assert_eq!(store.file_state("a.py").unwrap().unwrap(), state);
        assert_eq!(store.all_tracked_files().unwrap(), vec![PathBuf::from("a.py")]);
        store.untrack_file("a.py").unwrap();
        assert!(store.file_state("a.py").unwrap().is_none());
    }

    #[test]
    fn schema_version_mismatch_is_a_database_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        {
            let store = Store::open(&path).unwrap();
            store.meta_set("schema_version", "999").unwrap();
        }
        let err = Store::open(&path).unwrap_err();
        assert!(matches!(err, EmberError::Database(_)));
    }

    #[test]
    fn match_expr_quotes_tokens() {
        assert_eq!(
            build_match_expr("parse config file").unwrap(),
            "\"parse\" OR \"config\" OR \"file\""
        );
        // Punctuation splits; nothing user-controlled reaches the parser.
        assert_eq!(
            build_match_expr("a-b (c)").unwrap(),
            "\"a\" OR \"b\" OR \"c\""
        );
        assert!(build_match_expr("  ... ").is_none());
    }

    #[test]
    fn count_unique_files_ignores_chunk_multiplicity() {
        let store = Store::open_in_memory().unwrap();
        store.add_chunk(&chunk("a.py", 1, "one")).unwrap();
        store.add_chunk(&chunk("a.py", 10, "two")).unwrap();
        store.add_chunk(&chunk("b.py", 1, "three")).unwrap();
        assert_eq!(store.count_chunks().unwrap(), 3);
        assert_eq!(store.count_unique_files().unwrap(), 2);
    }
}
