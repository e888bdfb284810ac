//! On-disk cache of extracted patches and candidate pairs.
//!
//! Extraction and nearest-neighbour search dominate the runtime and depend
//! only on the input image and a subset of the config, so their output is
//! persisted per [`CacheKey`]. Filtering, outlier removal and aggregation are
//! always recomputed.
//!
//! Cache format:
//! - `{key}.json`: manifest (format version, per-scale metadata, section lengths)
//! - `{key}_s{scale}.bin`: one file per scale holding three raw sections, in
//!   order: fixed-size patch records, pixel values, normalized values
//! - `{key}_pairs.bin`: raw `(query, candidate)` `u32` pairs
//!
//! Binary sections are native-endian dumps. The manifest is written last, so
//! a missing manifest means the entry was never completed.

use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::mem::size_of;
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::config::{BucketRange, Config, ExtractionMode};
use crate::error::{Error, Result};
use crate::pairing::{CandidatePair, PairGeneration, PatchArena};
use crate::patch::{Bucketed, GridShape, Patch, PatchPosition, PatchSet, PatchSetMeta};

/// Bumped whenever the on-disk layout changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Key
// ============================================================================

/// Config fields that change extraction or pairing output.
#[derive(Serialize)]
struct KeyFields<'a> {
    identity: &'a str,
    scales: &'a [f32],
    patch_size: usize,
    extraction: ExtractionMode,
    num_buckets: usize,
    candidate_buckets: BucketRange,
    query_buckets: BucketRange,
    k_nearest: usize,
    num_query_patches: usize,
    seed: u64,
}

/// Identifies one cached extraction + pairing run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hash the input identity (typically the image path) together with the
    /// config fields the cached stages depend on.
    pub fn new(identity: &str, config: &Config) -> Result<Self> {
        let fields = KeyFields {
            identity,
            scales: &config.scales,
            patch_size: config.patch_size,
            extraction: config.extraction,
            num_buckets: config.num_buckets,
            candidate_buckets: config.candidate_buckets,
            query_buckets: config.query_buckets,
            k_nearest: config.k_nearest,
            num_query_patches: config.num_query_patches,
            seed: config.seed,
        };
        let bytes = serde_json::to_vec(&fields)
            .map_err(|e| Error::invalid_config("cache_key", e.to_string()))?;

        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        Ok(Self(format!("{:016x}", hasher.finish())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Manifest and records
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    scales: Vec<ScaleEntry>,
    pair_count: usize,
    candidate_count: usize,
    query_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScaleEntry {
    scale_index: usize,
    scale_factor: f32,
    image_width: usize,
    image_height: usize,
    patch_size: usize,
    step: usize,
    rows: usize,
    cols: usize,
    patch_count: usize,
}

impl ScaleEntry {
    fn values_per_patch(&self) -> usize {
        self.patch_size * self.patch_size * 3
    }

    fn meta(&self) -> PatchSetMeta {
        PatchSetMeta {
            scale_index: self.scale_index,
            scale_factor: self.scale_factor,
            image_width: self.image_width,
            image_height: self.image_height,
            patch_size: self.patch_size,
            step: self.step,
            grid: GridShape {
                rows: self.rows,
                cols: self.cols,
            },
        }
    }
}

/// Fixed-size part of a patch.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct PatchRecord {
    mean: [f32; 3],
    std_dev: f32,
    raw_std_dev: f32,
    bucket: u32,
    row: u32,
    col: u32,
}

/// What a cache hit restores.
#[derive(Debug)]
pub struct CachedRun {
    pub arena: PatchArena,
    pub generation: PairGeneration,
}

// ============================================================================
// Store
// ============================================================================

/// Directory-backed cache of patch arenas and candidate pairs.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn manifest_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }

    fn scale_path(&self, key: &CacheKey, scale: usize) -> PathBuf {
        self.dir.join(format!("{}_s{}.bin", key.as_str(), scale))
    }

    fn pairs_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}_pairs.bin", key.as_str()))
    }

    /// Persist an arena and its candidate pairs under `key`.
    pub fn save(
        &self,
        key: &CacheKey,
        arena: &PatchArena,
        generation: &PairGeneration,
    ) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|source| Error::Cache {
            path: self.dir.clone(),
            source,
        })?;

        let mut scales = Vec::with_capacity(arena.spans().len());
        for (i, span) in arena.spans().iter().enumerate() {
            let patches = arena.scale_patches(span);
            let records: Vec<PatchRecord> = patches
                .iter()
                .map(|p| PatchRecord {
                    mean: p.mean,
                    std_dev: p.std_dev,
                    raw_std_dev: p.raw_std_dev,
                    bucket: p.bucket as u32,
                    row: p.position.row as u32,
                    col: p.position.col as u32,
                })
                .collect();
            let pixels: Vec<f32> = patches.iter().flat_map(|p| p.pixels.iter().copied()).collect();
            let normalized: Vec<f32> = patches
                .iter()
                .flat_map(|p| p.normalized.iter().copied())
                .collect();

            write_sections(
                &self.scale_path(key, i),
                &[
                    bytemuck::cast_slice(&records),
                    bytemuck::cast_slice(&pixels),
                    bytemuck::cast_slice(&normalized),
                ],
            )?;

            let meta = span.meta;
            scales.push(ScaleEntry {
                scale_index: meta.scale_index,
                scale_factor: meta.scale_factor,
                image_width: meta.image_width,
                image_height: meta.image_height,
                patch_size: meta.patch_size,
                step: meta.step,
                rows: meta.grid.rows,
                cols: meta.grid.cols,
                patch_count: span.len,
            });
        }

        write_sections(
            &self.pairs_path(key),
            &[bytemuck::cast_slice(&generation.pairs)],
        )?;

        let manifest = Manifest {
            version: CACHE_FORMAT_VERSION,
            scales,
            pair_count: generation.pairs.len(),
            candidate_count: generation.candidate_count,
            query_count: generation.query_count,
        };
        let manifest_path = self.manifest_path(key);
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| cache_error(&manifest_path, io::Error::other(e)))?;
        std::fs::write(&manifest_path, json).map_err(|e| cache_error(&manifest_path, e))?;

        tracing::info!(
            key = key.as_str(),
            dir = %self.dir.display(),
            patches = arena.len(),
            pairs = generation.pairs.len(),
            "Saved patch cache"
        );
        Ok(())
    }

    /// Restore the entry for `key`.
    ///
    /// `Ok(None)` on a miss, including entries written by another format
    /// version or whose files do not match their manifest.
    pub fn load(&self, key: &CacheKey) -> Result<Option<CachedRun>> {
        let manifest_path = self.manifest_path(key);
        let bytes = match std::fs::read(&manifest_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(key = key.as_str(), "Patch cache miss");
                return Ok(None);
            }
            Err(e) => return Err(cache_error(&manifest_path, e)),
        };

        let manifest: Manifest = match serde_json::from_slice(&bytes) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!(
                    path = %manifest_path.display(),
                    error = %e,
                    "Unreadable cache manifest, ignoring"
                );
                return Ok(None);
            }
        };
        if manifest.version != CACHE_FORMAT_VERSION {
            tracing::warn!(
                found = manifest.version,
                expected = CACHE_FORMAT_VERSION,
                "Cache format version mismatch, ignoring entry"
            );
            return Ok(None);
        }

        let mut sets = Vec::with_capacity(manifest.scales.len());
        for (i, entry) in manifest.scales.iter().enumerate() {
            match self.load_scale(&self.scale_path(key, i), entry)? {
                Some(set) => sets.push(set),
                None => return Ok(None),
            }
        }
        let arena = PatchArena::new(sets);

        let pairs_path = self.pairs_path(key);
        let expected = manifest.pair_count * size_of::<CandidatePair>();
        let Some(mut reader) = open_exact(&pairs_path, expected)? else {
            tracing::warn!(
                path = %pairs_path.display(),
                "Cached pairs do not match manifest, ignoring entry"
            );
            return Ok(None);
        };
        let pairs: Vec<CandidatePair> = read_pod(&mut reader, &pairs_path, manifest.pair_count)?;
        if pairs
            .iter()
            .any(|p| p.query.index() >= arena.len() || p.candidate.index() >= arena.len())
        {
            tracing::warn!(
                path = %pairs_path.display(),
                "Cached pair references unknown patch, ignoring entry"
            );
            return Ok(None);
        }

        tracing::info!(
            key = key.as_str(),
            patches = arena.len(),
            pairs = pairs.len(),
            "Loaded patch cache"
        );

        Ok(Some(CachedRun {
            arena,
            generation: PairGeneration {
                pairs,
                candidate_count: manifest.candidate_count,
                query_count: manifest.query_count,
            },
        }))
    }

    fn load_scale(&self, path: &Path, entry: &ScaleEntry) -> Result<Option<PatchSet<Bucketed>>> {
        let n = entry.patch_count;
        let per_patch = entry.values_per_patch();
        let expected = n * size_of::<PatchRecord>() + 2 * n * per_patch * size_of::<f32>();

        let reader = if per_patch == 0 {
            None
        } else {
            open_exact(path, expected)?
        };
        let Some(mut reader) = reader else {
            tracing::warn!(
                path = %path.display(),
                "Cached scale does not match manifest, ignoring entry"
            );
            return Ok(None);
        };

        let records: Vec<PatchRecord> = read_pod(&mut reader, path, n)?;
        let pixels: Vec<f32> = read_pod(&mut reader, path, n * per_patch)?;
        let normalized: Vec<f32> = read_pod(&mut reader, path, n * per_patch)?;

        let patches = records
            .iter()
            .zip(pixels.chunks_exact(per_patch))
            .zip(normalized.chunks_exact(per_patch))
            .map(|((record, px), norm)| Patch {
                pixels: px.to_vec(),
                mean: record.mean,
                std_dev: record.std_dev,
                raw_std_dev: record.raw_std_dev,
                normalized: norm.to_vec(),
                bucket: record.bucket as u8,
                position: PatchPosition {
                    scale_index: entry.scale_index,
                    row: record.row as usize,
                    col: record.col as usize,
                },
            })
            .collect();

        Ok(Some(PatchSet::from_parts(entry.meta(), patches)))
    }
}

// ============================================================================
// File helpers
// ============================================================================

fn cache_error(path: &Path, source: io::Error) -> Error {
    Error::Cache {
        path: path.to_path_buf(),
        source,
    }
}

/// Write byte sections back to back into `path`.
fn write_sections(path: &Path, sections: &[&[u8]]) -> Result<()> {
    let file = File::create(path).map_err(|e| cache_error(path, e))?;
    let mut writer = BufWriter::new(file);
    for bytes in sections {
        writer.write_all(bytes).map_err(|e| cache_error(path, e))?;
    }
    writer.flush().map_err(|e| cache_error(path, e))?;
    Ok(())
}

/// Open `path` for reading if it holds exactly `expected_len` bytes.
///
/// `Ok(None)` if the file is missing or has any other size.
fn open_exact(path: &Path, expected_len: usize) -> Result<Option<BufReader<File>>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(cache_error(path, e)),
    };
    let len = file.metadata().map_err(|e| cache_error(path, e))?.len();
    if len != expected_len as u64 {
        return Ok(None);
    }
    Ok(Some(BufReader::new(file)))
}

/// Read `len` values of `T` into a correctly aligned buffer.
fn read_pod<T: Pod>(reader: &mut impl Read, path: &Path, len: usize) -> Result<Vec<T>> {
    let mut values = vec![T::zeroed(); len];
    reader
        .read_exact(bytemuck::cast_slice_mut(&mut values))
        .map_err(|e| cache_error(path, e))?;
    Ok(values)
}
