//! Flat similarity index over fixed-dimension vectors.
//!
//! The store is an arena: slot `i` in `records` owns `vectors[i * D..(i + 1) * D]`,
//! and `records[i].index == i` always. Slots are never reused. Removing anything
//! means building a fresh, densely re-indexed arena.
//!
//! On disk a store is two files in the character directory:
//! - `vectors.bin` - header (magic, dimension, count) followed by little-endian f32s
//! - `vectors.meta.json` - the record list

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::embedding::{EmbeddingError, EmbeddingProvider};

pub const VECTORS_FILE: &str = "vectors.bin";
pub const META_FILE: &str = "vectors.meta.json";

const MAGIC: &[u8; 4] = b"CMV1";
const HEADER_LEN: usize = 12;

/// Most recent episodes always surfaced by `search`
const ANCHOR_COUNT: usize = 3;
/// Extra similarity candidates fetched before threshold filtering
const SEARCH_OVERFETCH: usize = 5;
/// Above this many vectors the stricter distance threshold applies
const DENSE_STORE_SIZE: usize = 50;
const DENSE_THRESHOLD: f32 = 2.5;
const SPARSE_THRESHOLD: f32 = 4.0;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmbeddingKind {
    Episode,
    EpisodeContinue,
    PermanentFact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub index: usize,
    pub kind: EmbeddingKind,
    pub source_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_category: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub record: EmbeddingRecord,
    /// Squared L2 distance; `0.0` for recency anchors
    pub distance: f32,
    pub anchor: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Vector metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Dimension mismatch: store uses {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index mismatch: {vectors} vectors but {records} records")]
    IndexMismatch { vectors: usize, records: usize },

    #[error("Vector store is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct MetaFile {
    dimension: usize,
    records: Vec<EmbeddingRecord>,
}

/// Vectors and records, always mutated together.
#[derive(Debug, Clone)]
struct Arena {
    dimension: usize,
    vectors: Vec<f32>,
    records: Vec<EmbeddingRecord>,
}

impl Arena {
    fn empty(dimension: usize) -> Self {
        Self { dimension, vectors: Vec::new(), records: Vec::new() }
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn vector(&self, index: usize) -> &[f32] {
        &self.vectors[index * self.dimension..(index + 1) * self.dimension]
    }

    fn push(&mut self, vector: &[f32], mut record: EmbeddingRecord) -> usize {
        let index = self.records.len();
        record.index = index;
        self.vectors.extend_from_slice(vector);
        self.records.push(record);
        index
    }

    fn check_invariants(&self) -> Result<(), VectorStoreError> {
        let vectors = self.vectors.len() / self.dimension.max(1);
        if self.vectors.len() != self.records.len() * self.dimension {
            return Err(VectorStoreError::IndexMismatch { vectors, records: self.records.len() });
        }
        if let Some(bad) = self.records.iter().enumerate().find(|(i, r)| r.index != *i) {
            return Err(VectorStoreError::Corrupt(format!(
                "record at position {} claims index {}",
                bad.0, bad.1.index
            )));
        }
        Ok(())
    }
}

pub struct VectorMemoryStore {
    dir: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    arena: RwLock<Arena>,
}

impl VectorMemoryStore {
    /// Open the store in `dir`. Missing files give an empty store; a half-written
    /// pair or diverging vector/record counts are refused.
    pub fn load(
        dir: impl AsRef<Path>,
        dimension: usize,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, VectorStoreError> {
        let dir = dir.as_ref().to_path_buf();
        if embedder.dimension() != dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: dimension,
                actual: embedder.dimension(),
            });
        }

        let vectors_path = dir.join(VECTORS_FILE);
        let meta_path = dir.join(META_FILE);
        let arena = match (vectors_path.exists(), meta_path.exists()) {
            (false, false) => {
                log::info!("[VECTORS] No index in {}, starting empty", dir.display());
                Arena::empty(dimension)
            }
            (true, true) => {
                let arena = read_arena(&vectors_path, &meta_path, dimension)?;
                log::info!("[VECTORS] Loaded {} vectors (dim {}) from {}", arena.len(), dimension, dir.display());
                arena
            }
            (true, false) => {
                return Err(VectorStoreError::Corrupt(format!("{} exists without {}", VECTORS_FILE, META_FILE)));
            }
            (false, true) => {
                return Err(VectorStoreError::Corrupt(format!("{} exists without {}", META_FILE, VECTORS_FILE)));
            }
        };

        Ok(Self { dir, embedder, arena: RwLock::new(arena) })
    }

    pub fn dimension(&self) -> usize {
        self.arena.read().dimension
    }

    pub fn len(&self) -> usize {
        self.arena.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every record in slot order
    pub fn records(&self) -> Vec<EmbeddingRecord> {
        self.arena.read().records.clone()
    }

    /// Embed `text` and append it. Nothing is written when embedding fails.
    pub async fn add(
        &self,
        text: &str,
        kind: EmbeddingKind,
        source_category: Option<&str>,
    ) -> Result<usize, VectorStoreError> {
        let vector = self.embedder.embed(text).await?;
        let dimension = self.dimension();
        if vector.len() != dimension {
            return Err(VectorStoreError::DimensionMismatch { expected: dimension, actual: vector.len() });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(VectorStoreError::Embedding(EmbeddingError::InvalidResponse(
                "embedding contains non-finite values".to_string(),
            )));
        }

        let record = EmbeddingRecord {
            index: 0,
            kind,
            source_text: text.to_string(),
            source_category: source_category.map(str::to_string),
            timestamp: Utc::now(),
        };

        let mut arena = self.arena.write();
        let index = arena.push(&vector, record);
        if let Err(e) = write_arena(&self.dir, &arena) {
            // Roll back so memory never runs ahead of what could be persisted
            arena.records.pop();
            let keep = arena.records.len() * arena.dimension;
            arena.vectors.truncate(keep);
            return Err(e);
        }

        log::debug!("[VECTORS] Added #{} ({})", index, kind);
        Ok(index)
    }

    /// Recency anchors first, then nearest neighbours within the distance threshold.
    /// A failing embedder yields an empty result rather than an error.
    pub async fn search(&self, query: &str, k: usize) -> Vec<SearchHit> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }

        let query_vector = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                log::warn!("[VECTORS] Query embedding failed, skipping retrieval: {}", e);
                return Vec::new();
            }
        };

        let arena = self.arena.read();
        if query_vector.len() != arena.dimension {
            log::warn!(
                "[VECTORS] Query vector has dimension {}, store uses {}",
                query_vector.len(),
                arena.dimension
            );
            return Vec::new();
        }

        let n = arena.len();
        let anchors: Vec<usize> = arena
            .records
            .iter()
            .rev()
            .filter(|r| r.kind == EmbeddingKind::Episode)
            .take(ANCHOR_COUNT)
            .map(|r| r.index)
            .collect();
        let anchor_set: HashSet<usize> = anchors.iter().copied().collect();

        let mut scored: Vec<(usize, f32)> = (0..n)
            .map(|i| (i, squared_l2(&query_vector, arena.vector(i))))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate((k + SEARCH_OVERFETCH).min(n));

        let mut hits: Vec<SearchHit> = anchors
            .iter()
            .map(|&i| SearchHit { record: arena.records[i].clone(), distance: 0.0, anchor: true })
            .collect();
        hits.extend(
            scored
                .into_iter()
                .filter(|(i, d)| within_threshold(*d, n) && !anchor_set.contains(i))
                .map(|(i, d)| SearchHit { record: arena.records[i].clone(), distance: d, anchor: false }),
        );
        hits.truncate(k);
        hits
    }

    /// Write both files from the current arena
    pub fn persist(&self) -> Result<(), VectorStoreError> {
        let arena = self.arena.read();
        write_arena(&self.dir, &arena)
    }

    /// Rebuild the arena without the records matching `exclude`, re-indexing densely.
    /// Returns how many records were removed.
    pub fn rebuild_excluding<F>(&self, exclude: F) -> Result<usize, VectorStoreError>
    where
        F: Fn(&EmbeddingRecord) -> bool,
    {
        let mut arena = self.arena.write();
        let mut rebuilt = Arena::empty(arena.dimension);
        for record in &arena.records {
            if !exclude(record) {
                rebuilt.push(arena.vector(record.index), record.clone());
            }
        }
        let removed = arena.len() - rebuilt.len();

        write_arena(&self.dir, &rebuilt)?;
        *arena = rebuilt;

        log::info!("[VECTORS] Rebuilt index: removed {}, kept {}", removed, arena.len());
        Ok(removed)
    }
}

fn distance_threshold(store_size: usize) -> f32 {
    if store_size > DENSE_STORE_SIZE {
        DENSE_THRESHOLD
    } else {
        SPARSE_THRESHOLD
    }
}

/// A candidate exactly at the threshold still counts as a match.
fn within_threshold(distance: f32, store_size: usize) -> bool {
    distance <= distance_threshold(store_size)
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn read_arena(vectors_path: &Path, meta_path: &Path, dimension: usize) -> Result<Arena, VectorStoreError> {
    let blob = fs::read(vectors_path)?;
    if blob.len() < HEADER_LEN || &blob[..4] != MAGIC {
        return Err(VectorStoreError::Corrupt(format!("{} has no valid header", VECTORS_FILE)));
    }
    let stored_dimension = u32::from_le_bytes([blob[4], blob[5], blob[6], blob[7]]) as usize;
    let count = u32::from_le_bytes([blob[8], blob[9], blob[10], blob[11]]) as usize;
    if stored_dimension != dimension {
        return Err(VectorStoreError::DimensionMismatch { expected: dimension, actual: stored_dimension });
    }

    let expected_len = HEADER_LEN + count * dimension * std::mem::size_of::<f32>();
    if blob.len() != expected_len {
        return Err(VectorStoreError::Corrupt(format!(
            "{} length {} does not match {} vectors",
            VECTORS_FILE,
            blob.len(),
            count
        )));
    }
    let vectors: Vec<f32> = blob[HEADER_LEN..]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let meta: MetaFile = serde_json::from_slice(&fs::read(meta_path)?)?;
    if meta.dimension != dimension {
        return Err(VectorStoreError::DimensionMismatch { expected: dimension, actual: meta.dimension });
    }
    if meta.records.len() != count {
        return Err(VectorStoreError::IndexMismatch { vectors: count, records: meta.records.len() });
    }

    let arena = Arena { dimension, vectors, records: meta.records };
    arena.check_invariants()?;
    Ok(arena)
}

fn write_arena(dir: &Path, arena: &Arena) -> Result<(), VectorStoreError> {
    arena.check_invariants()?;
    fs::create_dir_all(dir)?;

    let mut blob = Vec::with_capacity(HEADER_LEN + std::mem::size_of_val(arena.vectors.as_slice()));
    blob.extend_from_slice(MAGIC);
    blob.extend_from_slice(&(arena.dimension as u32).to_le_bytes());
    blob.extend_from_slice(&(arena.len() as u32).to_le_bytes());
    for value in &arena.vectors {
        blob.extend_from_slice(&value.to_le_bytes());
    }

    let meta = MetaFile { dimension: arena.dimension, records: arena.records.clone() };
    let meta_json = serde_json::to_vec_pretty(&meta)?;

    write_atomic(&dir.join(VECTORS_FILE), &blob)?;
    write_atomic(&dir.join(META_FILE), &meta_json)?;
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
