//! On-disk layout of a persisted index.
//!
//! A directory holds three artifacts sharing one generation id:
//!
//! - `vectors.bin`: `b"CFVX"`, `u32` format version, `u32` dimension,
//!   `u64` vector count, 16-byte generation id, then `count * dimension`
//!   little-endian `f32` values.
//! - `metadata.json`: generation, build time and the chunk records.
//! - `lexical.json` (optional): the fitted BM25 index.
//!
//! Saves write `*.tmp` siblings first and rename them into place only once
//! all of them are complete, `metadata.json` last. The artifacts being
//! replaced are hard-linked to `*.bak` beforehand, so a rename that fails
//! halfway puts the previous set back. A process killed mid-swap can leave
//! new vectors beside old metadata; the shared generation id turns that into
//! a [`CasefileError::CorruptIndex`] on load rather than a silent mix.

use std::path::{Path, PathBuf};

use casefile_core::{CasefileError, CasefileResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bm25::Bm25Index;
use crate::chunk_store::ChunkStore;
use crate::snapshot::IndexSnapshot;
use crate::source::SourceChunk;
use crate::vector::FlatIpIndex;

const VECTORS_FILE: &str = "vectors.bin";
const METADATA_FILE: &str = "metadata.json";
const LEXICAL_FILE: &str = "lexical.json";

const VECTORS_MAGIC: &[u8; 4] = b"CFVX";
const VECTORS_VERSION: u32 = 1;
const VECTORS_HEADER_LEN: usize = 4 + 4 + 4 + 8 + 16;

/// Schema version written into `metadata.json`.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct PersistedMetadata {
    schema_version: u32,
    generation: Uuid,
    created_at: DateTime<Utc>,
    records: Vec<SourceChunk>,
}

#[derive(Serialize, Deserialize)]
struct PersistedLexical {
    generation: Uuid,
    index: Bm25Index,
}

/// The artifact paths of one index directory.
#[derive(Debug, Clone)]
pub struct IndexFiles {
    dir: PathBuf,
}

impl IndexFiles {
    /// Address the index stored in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the artifacts.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the vector blob.
    pub fn vectors_path(&self) -> PathBuf {
        self.dir.join(VECTORS_FILE)
    }

    /// Path of the chunk/metadata file.
    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// Path of the lexical index file.
    pub fn lexical_path(&self) -> PathBuf {
        self.dir.join(LEXICAL_FILE)
    }

    /// Persist `snapshot`, replacing whatever the directory held.
    ///
    /// On failure the `*.tmp` files are removed and the previous artifacts
    /// are left as they were.
    pub async fn save(&self, snapshot: &IndexSnapshot) -> CasefileResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let staged = match self.write_staged(snapshot).await {
            Ok(staged) => staged,
            Err(e) => {
                self.remove_staged().await;
                return Err(e);
            }
        };
        if let Err(e) = self.promote(&staged).await {
            self.remove_staged().await;
            return Err(e);
        }

        info!(
            dir = %self.dir.display(),
            chunks = snapshot.store().len(),
            generation = %snapshot.generation(),
            "Saved index"
        );
        Ok(())
    }

    /// Load the persisted index.
    ///
    /// Returns `Ok(None)` when the vector blob or the metadata file is
    /// absent. Any inconsistency between the artifacts is a
    /// [`CasefileError::CorruptIndex`].
    pub async fn load(&self) -> CasefileResult<Option<IndexSnapshot>> {
        let Some(meta_raw) = read_optional(&self.metadata_path()).await? else {
            debug!(dir = %self.dir.display(), "No metadata file, nothing to load");
            return Ok(None);
        };
        let Some(vec_raw) = read_optional(&self.vectors_path()).await? else {
            debug!(dir = %self.dir.display(), "No vector file, nothing to load");
            return Ok(None);
        };

        let metadata: PersistedMetadata = serde_json::from_slice(&meta_raw)
            .map_err(|e| CasefileError::CorruptIndex(format!("Failed to parse metadata: {e}")))?;
        if metadata.schema_version != SCHEMA_VERSION {
            return Err(CasefileError::CorruptIndex(format!(
                "Unsupported metadata schema version {}",
                metadata.schema_version
            )));
        }

        let (vec_generation, vectors) = decode_vectors(&vec_raw)?;
        if vec_generation != metadata.generation {
            return Err(CasefileError::CorruptIndex(format!(
                "Generation mismatch: metadata {}, vectors {vec_generation}",
                metadata.generation
            )));
        }
        if vectors.len() != metadata.records.len() {
            return Err(CasefileError::CorruptIndex(format!(
                "Chunk/vector count mismatch: {} chunks, {} vectors",
                metadata.records.len(),
                vectors.len()
            )));
        }

        let lexical = match read_optional(&self.lexical_path()).await? {
            None => {
                warn!(dir = %self.dir.display(), "No lexical index on disk, search will be vector-only");
                None
            }
            Some(raw) => {
                let lexical: PersistedLexical = serde_json::from_slice(&raw).map_err(|e| {
                    CasefileError::CorruptIndex(format!("Failed to parse lexical index: {e}"))
                })?;
                if lexical.generation != metadata.generation {
                    return Err(CasefileError::CorruptIndex(format!(
                        "Generation mismatch: metadata {}, lexical {}",
                        metadata.generation, lexical.generation
                    )));
                }
                if lexical.index.document_count() != metadata.records.len() {
                    return Err(CasefileError::CorruptIndex(format!(
                        "Lexical document count {} does not match chunk count {}",
                        lexical.index.document_count(),
                        metadata.records.len()
                    )));
                }
                lexical.index.validate()?;
                Some(lexical.index)
            }
        };

        let (texts, metas): (Vec<String>, Vec<_>) = metadata
            .records
            .into_iter()
            .map(|r| (r.text, r.metadata))
            .unzip();
        let store = ChunkStore::from_parts(texts, metas)
            .ok_or_else(|| CasefileError::CorruptIndex("Chunk/metadata length mismatch".into()))?;

        let snapshot = IndexSnapshot::new(
            store,
            vectors,
            lexical,
            metadata.generation,
            metadata.created_at,
        )
        .map_err(|e| CasefileError::CorruptIndex(e.to_string()))?;

        info!(
            dir = %self.dir.display(),
            chunks = snapshot.store().len(),
            generation = %snapshot.generation(),
            "Loaded index"
        );
        Ok(Some(snapshot))
    }

    async fn write_staged(&self, snapshot: &IndexSnapshot) -> CasefileResult<Vec<(PathBuf, PathBuf)>> {
        let mut staged = Vec::with_capacity(2);

        let vectors_tmp = tmp_path(&self.vectors_path());
        tokio::fs::write(&vectors_tmp, encode_vectors(snapshot.vectors(), snapshot.generation()))
            .await?;
        staged.push((vectors_tmp, self.vectors_path()));

        if let Some(index) = snapshot.lexical() {
            let lexical_tmp = tmp_path(&self.lexical_path());
            let body = serde_json::to_vec(&PersistedLexical {
                generation: snapshot.generation(),
                index: index.clone(),
            })?;
            tokio::fs::write(&lexical_tmp, body).await?;
            staged.push((lexical_tmp, self.lexical_path()));
        }

        let records: Vec<SourceChunk> = snapshot
            .store()
            .iter()
            .map(|(_, text, meta)| SourceChunk::new(text, meta.clone()))
            .collect();
        let body = serde_json::to_vec(&PersistedMetadata {
            schema_version: SCHEMA_VERSION,
            generation: snapshot.generation(),
            created_at: snapshot.built_at(),
            records,
        })?;
        tokio::fs::write(tmp_path(&self.metadata_path()), body).await?;

        Ok(staged)
    }

    fn artifact_paths(&self) -> [PathBuf; 3] {
        [self.vectors_path(), self.lexical_path(), self.metadata_path()]
    }

    /// Swap the staged files in, restoring the previous artifacts if any
    /// step fails.
    async fn promote(&self, staged: &[(PathBuf, PathBuf)]) -> CasefileResult<()> {
        let backed_up = self.back_up_current().await?;
        match self.swap_in(staged).await {
            Ok(()) => {
                self.remove_backups().await;
                Ok(())
            }
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Swap failed, restoring previous index");
                self.restore(&backed_up).await;
                Err(e)
            }
        }
    }

    async fn swap_in(&self, staged: &[(PathBuf, PathBuf)]) -> CasefileResult<()> {
        for (tmp, target) in staged {
            tokio::fs::rename(tmp, target).await?;
        }
        let lexical = self.lexical_path();
        if !staged.iter().any(|(_, target)| *target == lexical) {
            remove_if_exists(&lexical).await?;
        }
        // metadata.json carries the generation read first on load, so it goes last
        tokio::fs::rename(tmp_path(&self.metadata_path()), self.metadata_path()).await?;
        Ok(())
    }

    /// Hard-link every existing artifact to its `*.bak` sibling.
    async fn back_up_current(&self) -> CasefileResult<Vec<PathBuf>> {
        let mut backed_up = Vec::new();
        for path in self.artifact_paths() {
            let backup = backup_path(&path);
            let linked = match remove_if_exists(&backup).await {
                Ok(()) => tokio::fs::hard_link(&path, &backup).await,
                Err(e) => {
                    self.remove_backups().await;
                    return Err(e);
                }
            };
            match linked {
                Ok(()) => backed_up.push(path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    self.remove_backups().await;
                    return Err(e.into());
                }
            }
        }
        Ok(backed_up)
    }

    /// Put the backed-up artifacts back; artifacts that did not exist before
    /// the swap are removed.
    async fn restore(&self, backed_up: &[PathBuf]) {
        for path in self.artifact_paths() {
            let outcome = if backed_up.contains(&path) {
                tokio::fs::rename(backup_path(&path), &path)
                    .await
                    .map_err(CasefileError::from)
            } else {
                remove_if_exists(&path).await
            };
            if let Err(e) = outcome {
                warn!(path = %path.display(), error = %e, "Failed to restore index file");
            }
        }
    }

    async fn remove_backups(&self) {
        for path in self.artifact_paths() {
            if let Err(e) = remove_if_exists(&backup_path(&path)).await {
                warn!(path = %path.display(), error = %e, "Failed to remove backup file");
            }
        }
    }

    async fn remove_staged(&self) {
        for path in self.artifact_paths() {
            if let Err(e) = remove_if_exists(&tmp_path(&path)).await {
                warn!(path = %path.display(), error = %e, "Failed to remove staged file");
            }
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}

fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, ".bak")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

async fn read_optional(path: &Path) -> CasefileResult<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_if_exists(path: &Path) -> CasefileResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn encode_vectors(index: &FlatIpIndex, generation: Uuid) -> Vec<u8> {
    let values = index.as_slice();
    let mut buf = Vec::with_capacity(VECTORS_HEADER_LEN + values.len() * 4);
    buf.extend_from_slice(VECTORS_MAGIC);
    buf.extend_from_slice(&VECTORS_VERSION.to_le_bytes());
    buf.extend_from_slice(&(index.dimension() as u32).to_le_bytes());
    buf.extend_from_slice(&(index.len() as u64).to_le_bytes());
    buf.extend_from_slice(generation.as_bytes());
    for value in values {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf
}

fn decode_vectors(data: &[u8]) -> CasefileResult<(Uuid, FlatIpIndex)> {
    let corrupt = |msg: String| CasefileError::CorruptIndex(msg);

    if data.len() < VECTORS_HEADER_LEN {
        return Err(corrupt(format!(
            "Vector file truncated: {} bytes, header needs {VECTORS_HEADER_LEN}",
            data.len()
        )));
    }
    if &data[0..4] != VECTORS_MAGIC {
        return Err(corrupt("Vector file has bad magic".into()));
    }
    let version = read_u32(&data[4..8])?;
    if version != VECTORS_VERSION {
        return Err(corrupt(format!("Unsupported vector file version {version}")));
    }
    let dimension = read_u32(&data[8..12])? as usize;
    let count = read_u64(&data[12..20])? as usize;
    let generation = Uuid::from_slice(&data[20..36])
        .map_err(|e| corrupt(format!("Invalid generation id: {e}")))?;

    let expected = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| corrupt("Vector header sizes overflow".into()))?;
    let payload = &data[VECTORS_HEADER_LEN..];
    if payload.len() != expected {
        return Err(corrupt(format!(
            "Vector payload is {} bytes, header declares {count} x {dimension} floats ({expected} bytes)",
            payload.len()
        )));
    }

    let values: Vec<f32> = payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    let index = FlatIpIndex::from_raw(dimension, values)?;
    Ok((generation, index))
}

fn read_u32(bytes: &[u8]) -> CasefileResult<u32> {
    let arr: [u8; 4] = bytes
        .try_into()
        .map_err(|_| CasefileError::CorruptIndex("Invalid u32 field".into()))?;
    Ok(u32::from_le_bytes(arr))
}

fn read_u64(bytes: &[u8]) -> CasefileResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| CasefileError::CorruptIndex("Invalid u64 field".into()))?;
    Ok(u64::from_le_bytes(arr))
}
