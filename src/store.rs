use simd_r_drive::storage_engine::DataStore;
use simd_r_drive::storage_engine::traits::{DataStoreReader, DataStoreWriter};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::composition::CompositionKey;
use crate::constants::store::{
    ARTIFACT_PREFIX, ARTIFACT_RECORD_VERSION, BITCODE_PREFIX, DEFAULT_STORE_DIR,
    DEFAULT_STORE_FILENAME, META_KEY, STORE_VERSION,
};
use crate::descriptor::{DescriptorMatrix, canonical_centers};
use crate::errors::DedupError;
use crate::types::{ElementSymbol, GlobalIndex, ParamTag};

/// Content address of one group's descriptor artifact.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    tag: ParamTag,
    composition: CompositionKey,
}

impl CacheKey {
    /// Key for `composition` under parameter tag `tag`.
    pub fn new(tag: impl Into<ParamTag>, composition: CompositionKey) -> Self {
        Self {
            tag: tag.into(),
            composition,
        }
    }

    /// Descriptor parameter tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Group composition.
    pub fn composition(&self) -> &CompositionKey {
        &self.composition
    }

    fn storage_key(&self) -> Vec<u8> {
        let composition = self.composition.as_str();
        let mut key =
            Vec::with_capacity(ARTIFACT_PREFIX.len() + self.tag.len() + 1 + composition.len());
        key.extend_from_slice(ARTIFACT_PREFIX);
        key.extend_from_slice(self.tag.as_bytes());
        key.push(b':');
        key.extend_from_slice(composition.as_bytes());
        key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tag, self.composition)
    }
}

/// Cached descriptors of one group: features, global-index map, label flags.
#[derive(Clone, Debug, PartialEq)]
pub struct DescriptorArtifact {
    /// One descriptor row per structure of the group.
    pub features: DescriptorMatrix,
    /// Global structure index of each row.
    pub indices: Vec<GlobalIndex>,
    /// Label flag of each row.
    pub has_label: Vec<bool>,
    /// Sorted, deduplicated center elements the rows were computed with.
    pub center_elements: Vec<ElementSymbol>,
}

impl DescriptorArtifact {
    /// Build an artifact whose three parallel arrays have matching row counts.
    pub fn new(
        features: DescriptorMatrix,
        indices: Vec<GlobalIndex>,
        has_label: Vec<bool>,
    ) -> Result<Self, DedupError> {
        if features.rows() != indices.len() || indices.len() != has_label.len() {
            return Err(DedupError::Configuration(format!(
                "artifact arrays disagree: {} descriptor rows, {} indices, {} labels",
                features.rows(),
                indices.len(),
                has_label.len()
            )));
        }
        Ok(Self {
            features,
            indices,
            has_label,
            center_elements: Vec::new(),
        })
    }

    /// Record the center elements used to compute the rows.
    pub fn with_center_elements(mut self, center_elements: &[ElementSymbol]) -> Self {
        self.center_elements = canonical_centers(center_elements);
        self
    }

    /// Number of structures described.
    pub fn rows(&self) -> usize {
        self.indices.len()
    }
}

/// Content-addressed descriptor cache.
pub trait DescriptorStore: Send + Sync {
    /// Load the artifact stored under `key`, if any.
    fn get(&self, key: &CacheKey) -> Result<Option<DescriptorArtifact>, DedupError>;
    /// Store (or replace) the artifact under `key`.
    fn put(&self, key: &CacheKey, artifact: &DescriptorArtifact) -> Result<(), DedupError>;
    /// True when an entry exists under `key`, without validating it.
    fn contains(&self, key: &CacheKey) -> Result<bool, DedupError> {
        Ok(self.get(key)?.is_some())
    }
}

/// In-memory descriptor store, mostly for tests and single-shot runs.
#[derive(Default)]
pub struct InMemoryDescriptorStore {
    entries: RwLock<HashMap<CacheKey, DescriptorArtifact>>,
}

impl InMemoryDescriptorStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached artifacts.
    pub fn len(&self) -> usize {
        self.entries.read().map(|guard| guard.len()).unwrap_or(0)
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DescriptorStore for InMemoryDescriptorStore {
    fn get(&self, key: &CacheKey) -> Result<Option<DescriptorArtifact>, DedupError> {
        Ok(self
            .entries
            .read()
            .map_err(|_| DedupError::Store("descriptor store lock poisoned".into()))?
            .get(key)
            .cloned())
    }

    fn put(&self, key: &CacheKey, artifact: &DescriptorArtifact) -> Result<(), DedupError> {
        self.entries
            .write()
            .map_err(|_| DedupError::Store("descriptor store lock poisoned".into()))?
            .insert(key.clone(), artifact.clone());
        Ok(())
    }

    fn contains(&self, key: &CacheKey) -> Result<bool, DedupError> {
        Ok(self
            .entries
            .read()
            .map_err(|_| DedupError::Store("descriptor store lock poisoned".into()))?
            .contains_key(key))
    }
}

#[derive(Clone, Copy, Debug, bitcode::Encode, bitcode::Decode)]
/// Versioned metadata header stored in file-backed descriptor stores.
struct StoreMeta {
    version: u8,
}

/// Wire form of [`DescriptorArtifact`].
#[derive(Clone, Debug, bitcode::Encode, bitcode::Decode)]
struct ArtifactRecord {
    composition: CompositionKey,
    rows: u64,
    dim: u64,
    features: Vec<f32>,
    indices: Vec<u64>,
    has_label: Vec<bool>,
    center_elements: Vec<String>,
}

/// File-backed descriptor store shared by all workers of a run.
///
/// Entries are bitcode records inside one memory-mapped simd-r-drive file.
pub struct FileDescriptorStore {
    store: DataStore,
    path: PathBuf,
}

impl fmt::Debug for FileDescriptorStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDescriptorStore")
            .field("path", &self.path)
            .finish()
    }
}

impl FileDescriptorStore {
    /// Open (or create) a file-backed store at `path`.
    ///
    /// A directory path resolves to `DEFAULT_STORE_FILENAME` inside it.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, DedupError> {
        let path = coerce_store_path(path.into());
        ensure_parent_dir(&path)?;
        let store = DataStore::open(path.as_path()).map_err(map_store_err)?;
        let store = Self { store, path };
        store.verify_metadata()?;
        Ok(store)
    }

    /// Default store path under the crate's default cache directory.
    pub fn default_path() -> PathBuf {
        Self::default_path_in_dir(DEFAULT_STORE_DIR)
    }

    /// Default store path inside a custom directory.
    pub fn default_path_in_dir<P: AsRef<Path>>(dir: P) -> PathBuf {
        dir.as_ref().join(DEFAULT_STORE_FILENAME)
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn verify_metadata(&self) -> Result<(), DedupError> {
        match read_bytes(&self.store, META_KEY)? {
            Some(bytes) => {
                let meta = decode_store_meta(&bytes)?;
                if meta.version != STORE_VERSION {
                    return Err(DedupError::Store(format!(
                        "descriptor store version mismatch (expected {}, found {})",
                        STORE_VERSION, meta.version
                    )));
                }
            }
            None => {
                let payload = encode_store_meta(&StoreMeta {
                    version: STORE_VERSION,
                });
                write_bytes(&self.store, META_KEY, &payload)?;
            }
        }
        Ok(())
    }
}

impl DescriptorStore for FileDescriptorStore {
    fn get(&self, key: &CacheKey) -> Result<Option<DescriptorArtifact>, DedupError> {
        match read_bytes(&self.store, &key.storage_key())? {
            Some(bytes) => decode_artifact(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    fn put(&self, key: &CacheKey, artifact: &DescriptorArtifact) -> Result<(), DedupError> {
        let payload = encode_artifact(key, artifact);
        write_bytes(&self.store, &key.storage_key(), &payload)
    }

    fn contains(&self, key: &CacheKey) -> Result<bool, DedupError> {
        Ok(read_bytes(&self.store, &key.storage_key())?.is_some())
    }
}

fn encode_store_meta(meta: &StoreMeta) -> Vec<u8> {
    encode_bitcode_payload(&bitcode::encode(meta))
}

fn decode_store_meta(bytes: &[u8]) -> Result<StoreMeta, DedupError> {
    let raw = decode_bitcode_payload(bytes)
        .map_err(|details| DedupError::Store(format!("descriptor store metadata: {details}")))?;
    bitcode::decode(raw).map_err(|err| {
        DedupError::Store(format!("failed to decode descriptor store metadata: {err}"))
    })
}

fn encode_artifact(key: &CacheKey, artifact: &DescriptorArtifact) -> Vec<u8> {
    let (rows, dim, features) = artifact.features.clone().into_parts();
    let record = ArtifactRecord {
        composition: key.composition().clone(),
        rows: rows as u64,
        dim: dim as u64,
        features,
        indices: artifact.indices.iter().map(|idx| *idx as u64).collect(),
        has_label: artifact.has_label.clone(),
        center_elements: artifact.center_elements.clone(),
    };
    let payload = encode_bitcode_payload(&bitcode::encode(&record));
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(ARTIFACT_RECORD_VERSION);
    buf.extend_from_slice(&payload);
    buf
}

fn decode_artifact(key: &CacheKey, bytes: &[u8]) -> Result<DescriptorArtifact, DedupError> {
    let corrupt = |details: String| DedupError::CacheCorrupt {
        group: key.composition().to_string(),
        details,
    };
    match bytes.first() {
        Some(&ARTIFACT_RECORD_VERSION) => {}
        Some(_) => return Err(corrupt("artifact record version mismatch".into())),
        None => return Err(corrupt("empty artifact record".into())),
    }
    let raw = decode_bitcode_payload(&bytes[1..]).map_err(corrupt)?;
    let record: ArtifactRecord =
        bitcode::decode(raw).map_err(|err| corrupt(format!("undecodable artifact: {err}")))?;
    if &record.composition != key.composition() {
        return Err(corrupt(format!(
            "artifact belongs to group '{}'",
            record.composition
        )));
    }
    let features = DescriptorMatrix::new(record.rows as usize, record.dim as usize, record.features)
        .map_err(|err| corrupt(err.to_string()))?;
    let indices = record.indices.into_iter().map(|idx| idx as GlobalIndex).collect();
    DescriptorArtifact::new(features, indices, record.has_label)
        .map(|artifact| artifact.with_center_elements(&record.center_elements))
        .map_err(|err| corrupt(err.to_string()))
}

fn encode_bitcode_payload(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + bytes.len());
    out.push(BITCODE_PREFIX);
    out.extend_from_slice(bytes);
    out
}

fn decode_bitcode_payload(bytes: &[u8]) -> Result<&[u8], String> {
    if bytes.first().copied() != Some(BITCODE_PREFIX) {
        return Err("bitcode payload missing expected prefix".into());
    }
    Ok(&bytes[1..])
}

fn read_bytes(store: &DataStore, key: &[u8]) -> Result<Option<Vec<u8>>, DedupError> {
    store
        .read(key)
        .map_err(map_store_err)?
        .map(|entry| Ok(entry.as_ref().to_vec()))
        .transpose()
}

fn write_bytes(store: &DataStore, key: &[u8], payload: &[u8]) -> Result<(), DedupError> {
    store.write(key, payload).map_err(map_store_err)?;
    Ok(())
}

fn coerce_store_path(path: PathBuf) -> PathBuf {
    if path.is_dir() {
        return path.join(DEFAULT_STORE_FILENAME);
    }
    path
}

fn ensure_parent_dir(path: &Path) -> Result<(), DedupError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn map_store_err(err: io::Error) -> DedupError {
    DedupError::Store(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn artifact() -> DescriptorArtifact {
        let features =
            DescriptorMatrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]])
                .unwrap();
        DescriptorArtifact::new(features, vec![4, 9, 12], vec![true, false, true])
            .unwrap()
            .with_center_elements(&["O".to_string(), "C".to_string()])
    }

    fn key(composition: &str) -> CacheKey {
        CacheKey::new("00aa11bb22cc33dd", CompositionKey::from_rendered(composition))
    }

    #[test]
    fn artifact_rejects_mismatched_arrays() {
        let features = DescriptorMatrix::from_rows(vec![vec![1.0]]).unwrap();
        let err = DescriptorArtifact::new(features, vec![0, 1], vec![true]).unwrap_err();
        assert!(matches!(err, DedupError::Configuration(msg) if msg.contains("disagree")));
    }

    #[test]
    fn in_memory_store_round_trips() {
        let store = InMemoryDescriptorStore::new();
        assert!(store.is_empty());
        assert!(store.get(&key("CHO")).unwrap().is_none());
        store.put(&key("CHO"), &artifact()).unwrap();
        assert!(store.contains(&key("CHO")).unwrap());
        assert!(!store.contains(&key("CH")).unwrap());
        assert_eq!(store.get(&key("CHO")).unwrap(), Some(artifact()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn file_store_persists_artifacts_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache").join("descriptors.bin");
        let store = FileDescriptorStore::open(&path).unwrap();
        store.put(&key("CHO"), &artifact()).unwrap();
        drop(store);

        let reopened = FileDescriptorStore::open(&path).unwrap();
        assert_eq!(reopened.get(&key("CHO")).unwrap(), Some(artifact()));
        assert!(reopened.get(&key("HO")).unwrap().is_none());
        assert!(format!("{reopened:?}").contains("FileDescriptorStore"));
    }

    #[test]
    fn file_store_accepts_directory_path() {
        let dir = tempdir().unwrap();
        let store = FileDescriptorStore::open(dir.path()).unwrap();
        assert_eq!(store.path(), dir.path().join(DEFAULT_STORE_FILENAME));
        assert!(dir.path().join(DEFAULT_STORE_FILENAME).is_file());
    }

    #[test]
    fn tags_partition_the_key_space() {
        let store = InMemoryDescriptorStore::new();
        let composition = CompositionKey::from_rendered("CHO");
        store
            .put(&CacheKey::new("aaaa", composition.clone()), &artifact())
            .unwrap();
        assert!(store.get(&CacheKey::new("bbbb", composition)).unwrap().is_none());
        assert_eq!(key("CHO").to_string(), "00aa11bb22cc33dd:CHO");
        assert!(key("CHO").storage_key().starts_with(ARTIFACT_PREFIX));
    }

    #[test]
    fn file_store_rejects_version_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("versioned.bin");
        let store = FileDescriptorStore::open(&path).unwrap();
        let payload = encode_store_meta(&StoreMeta {
            version: STORE_VERSION.wrapping_add(1),
        });
        store.store.write(META_KEY, &payload).unwrap();
        drop(store);

        let err = FileDescriptorStore::open(&path).unwrap_err();
        assert!(matches!(err, DedupError::Store(msg) if msg.contains("version mismatch")));
    }

    #[test]
    fn corrupt_records_surface_as_cache_corrupt() {
        let dir = tempdir().unwrap();
        let store = FileDescriptorStore::open(dir.path().join("corrupt.bin")).unwrap();
        let cache_key = key("CHO");

        store.store.write(&cache_key.storage_key(), &[0xEE, 1]).unwrap();
        let err = store.get(&cache_key).unwrap_err();
        assert!(matches!(err, DedupError::CacheCorrupt { ref details, .. } if details.contains("version mismatch")));

        store
            .store
            .write(&cache_key.storage_key(), &[ARTIFACT_RECORD_VERSION, 0x00])
            .unwrap();
        let err = store.get(&cache_key).unwrap_err();
        assert!(matches!(err, DedupError::CacheCorrupt { ref details, .. } if details.contains("missing expected prefix")));

        store
            .store
            .write(
                &cache_key.storage_key(),
                &[ARTIFACT_RECORD_VERSION, BITCODE_PREFIX, 0xFF],
            )
            .unwrap();
        let err = store.get(&cache_key).unwrap_err();
        assert!(matches!(err, DedupError::CacheCorrupt { ref group, .. } if group == "CHO"));
    }

    #[test]
    fn artifact_under_wrong_key_is_rejected() {
        let encoded = encode_artifact(&key("CHO"), &artifact());
        let err = decode_artifact(&key("HO"), &encoded).unwrap_err();
        assert!(matches!(err, DedupError::CacheCorrupt { ref details, .. } if details.contains("belongs to group 'CHO'")));
        assert_eq!(decode_artifact(&key("CHO"), &encoded).unwrap(), artifact());
    }

    #[test]
    fn store_meta_requires_prefix() {
        let err = decode_store_meta(&[0x00, 0x01]).unwrap_err();
        assert!(matches!(err, DedupError::Store(msg) if msg.contains("missing expected prefix")));
        let mapped = map_store_err(io::Error::other("boom"));
        assert!(matches!(mapped, DedupError::Store(msg) if msg.contains("boom")));
    }
}
