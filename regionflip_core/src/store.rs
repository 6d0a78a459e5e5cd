use crate::mutator::SelectionMode;
use crate::oracle::Decodability;
use crate::session::Mutation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::info;

/// Number of leading file-name characters used for the per-image directory.
const SHORT_DIR_CHARS: usize = 8;
/// Number of hex digest characters appended to mutated file names.
const DIGEST_SUFFIX_CHARS: usize = 8;
/// Prefix of the saved pristine copy.
const PRISTINE_PREFIX: &str = "RAW-";

/// Errors raised while writing artifacts to disk.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("artifact I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// JSON sidecar written next to every mutated artifact.
///
/// Together with the pristine copy this is enough to replay the corruption:
/// either re-run with `seed`, or toggle `flipped_bits` directly.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMetadata {
    pub source_file: String,
    pub region: String,
    pub region_offset: usize,
    pub region_length: usize,
    pub bit_count: usize,
    pub mode: SelectionMode,
    pub seed: Option<u64>,
    pub attempt: u64,
    pub flipped_bits: Vec<usize>,
    pub decodability: String,
    pub decodable: bool,
    pub pristine_md5: String,
    pub mutated_md5: String,
}

impl ArtifactMetadata {
    pub fn describe(
        source_file: &str,
        pristine: &[u8],
        mutation: &Mutation,
        verdict: &Decodability,
        seed: Option<u64>,
        attempt: u64,
    ) -> Self {
        Self {
            source_file: source_file.to_string(),
            region: mutation.region.name.to_string(),
            region_offset: mutation.region.offset,
            region_length: mutation.region.length,
            bit_count: mutation.bit_count,
            mode: mutation.mode,
            seed,
            attempt,
            flipped_bits: mutation.flipped_bits.clone(),
            decodability: verdict.to_string(),
            decodable: verdict.is_decodable(),
            pristine_md5: format!("{:x}", md5::compute(pristine)),
            mutated_md5: mutation.digest_hex(),
        }
    }
}

/// Paths written by one [`ArtifactStore::save`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifacts {
    pub directory: PathBuf,
    pub pristine: PathBuf,
    pub mutated: PathBuf,
    pub metadata: PathBuf,
}

/// Writes pristine/mutated pairs under `<root>/<short name>/`.
///
/// Mutated files are named `<region>-<stem>-<unix millis>-<md5 prefix>.<ext>`;
/// the digest suffix keeps two mutations saved in the same millisecond apart.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory that holds all artifacts for `source_file`.
    pub fn directory_for(&self, source_file: &str) -> PathBuf {
        let short: String = source_file.chars().take(SHORT_DIR_CHARS).collect();
        self.root.join(short)
    }

    /// Writes the pristine copy, the mutated copy, and the JSON sidecar.
    ///
    /// # Arguments
    /// * `source_file`: File name (not path) of the original image.
    /// * `pristine`: The untouched bytes.
    /// * `mutation`: The corrupted copy to save.
    /// * `metadata`: Sidecar contents, usually from [`ArtifactMetadata::describe`].
    pub fn save(
        &self,
        source_file: &str,
        pristine: &[u8],
        mutation: &Mutation,
        metadata: &ArtifactMetadata,
    ) -> Result<SavedArtifacts, StoreError> {
        let directory = self.directory_for(source_file);
        fs::create_dir_all(&directory).map_err(|source| StoreError::Io {
            path: directory.clone(),
            source,
        })?;

        let pristine_path = directory.join(format!("{PRISTINE_PREFIX}{source_file}"));
        write_file(&pristine_path, pristine)?;

        let source_path = Path::new(source_file);
        let stem = source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(source_file);
        let extension = source_path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("jpg");
        let digest = mutation.digest_hex();
        let base_name = format!(
            "{}-{}-{}-{}",
            mutation.region.name,
            stem,
            unix_millis(),
            &digest[..DIGEST_SUFFIX_CHARS]
        );

        let mutated_path = directory.join(format!("{base_name}.{extension}"));
        write_file(&mutated_path, &mutation.buffer)?;

        let metadata_path = directory.join(format!("{base_name}.json"));
        let json = serde_json::to_vec_pretty(metadata)?;
        write_file(&metadata_path, &json)?;

        info!(
            directory = %directory.display(),
            mutated = %mutated_path.display(),
            "Saved artifacts"
        );

        Ok(SavedArtifacts {
            directory,
            pristine: pristine_path,
            mutated: mutated_path,
            metadata: metadata_path,
        })
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    fs::write(path, bytes).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0)
}
