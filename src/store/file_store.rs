//! Single-file chunk store
//!
//! File format:
//! ```text
//! [HEADER: 64 bytes]
//!   - magic: 8 bytes ("CHUNKMRG")
//!   - version: 4 bytes (u32 LE)
//!   - flags: 4 bytes
//!   - chunk_count: 8 bytes (u64 LE)
//!   - index_offset: 8 bytes (u64 LE)
//!   - root: 32 bytes
//!
//! [FRAMES and INDEXES: variable, append-only]
//!   - frame: codec byte + payload
//!   - index: sorted array of (ref, offset, size) entries
//! ```
//!
//! Nothing before the end of the file is ever rewritten except the header.
//! Each index write lands after all existing data and is flushed before the
//! header points at it, so the index named by the header is always intact.
//! Older indexes stay behind as dead space.
//!
//! The index, chunk count and root are persisted together on `sync` and on
//! every successful `update_root`, so a durable root never names a chunk
//! missing from the durable index.

use super::{frame, ChunkStore};
use crate::config::StoreConfig;
use crate::model::{Chunk, ContentRef};
use crate::{Error, Result, MAGIC, VERSION};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const HEADER_SIZE: u64 = 64;
const COUNT_OFFSET: u64 = 16;
// 32 (ref) + 8 (offset) + 4 (size)
const INDEX_ENTRY_SIZE: usize = 44;

/// Location of a frame in the file
#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    offset: u64,
    size: u32,
}

/// Append position and what the on-disk header currently describes
#[derive(Clone, Copy, Debug)]
struct Tail {
    /// End of the file; frames and indexes are appended here
    end: u64,
    /// Index the header points at (0 for none)
    index_offset: u64,
    /// `end` right after the last index write
    synced_end: u64,
}

impl Tail {
    fn fresh(end: u64, index_offset: u64) -> Self {
        Tail {
            end,
            index_offset,
            synced_end: end,
        }
    }

    /// Frames were appended since the last index write
    fn has_unindexed_frames(&self) -> bool {
        self.end != self.synced_end
    }
}

/// A content-addressed chunk store backed by a single file
pub struct FileStore {
    path: PathBuf,
    config: StoreConfig,
    file: Mutex<File>,
    index: RwLock<HashMap<ContentRef, IndexEntry>>,
    root: Mutex<ContentRef>,
    tail: Mutex<Tail>,
}

impl FileStore {
    /// Create a new store file with default settings
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with(path, StoreConfig::default())
    }

    /// Create a new store file, truncating anything at `path`
    pub fn create_with(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..12].copy_from_slice(&VERSION.to_le_bytes());
        file.write_all(&header)?;
        file.sync_all()?;

        debug!(path = %path.display(), "created chunk store");

        Ok(FileStore {
            path,
            config,
            file: Mutex::new(file),
            index: RwLock::new(HashMap::new()),
            root: Mutex::new(ContentRef::ZERO),
            tail: Mutex::new(Tail::fresh(HEADER_SIZE, 0)),
        })
    }

    /// Open an existing store file with default settings
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, StoreConfig::default())
    }

    /// Open an existing store file
    pub fn open_with(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)
            .map_err(|_| Error::InvalidFile("Truncated header".into()))?;

        if &header[0..8] != MAGIC {
            return Err(Error::InvalidFile("Invalid magic bytes".into()));
        }

        let version = read_u32(&header[8..12]);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            });
        }

        let chunk_count = read_u64(&header[16..24]);
        let index_offset = read_u64(&header[24..32]);
        let mut root_bytes = [0u8; 32];
        root_bytes.copy_from_slice(&header[32..64]);
        let root = ContentRef::from_bytes(root_bytes);

        // Frames written after the last index are unreachable but harmless;
        // new data goes after them.
        let end = file.seek(SeekFrom::End(0))?;

        let mut index = HashMap::new();
        if index_offset > 0 && chunk_count > 0 {
            let index_end = chunk_count
                .checked_mul(INDEX_ENTRY_SIZE as u64)
                .and_then(|len| len.checked_add(index_offset));
            if index_end.map_or(true, |index_end| index_end > end) {
                return Err(Error::InvalidFile("Index runs past end of file".into()));
            }

            file.seek(SeekFrom::Start(index_offset))?;
            for _ in 0..chunk_count {
                let mut entry_buf = [0u8; INDEX_ENTRY_SIZE];
                file.read_exact(&mut entry_buf)?;

                let mut ref_bytes = [0u8; 32];
                ref_bytes.copy_from_slice(&entry_buf[0..32]);
                let offset = read_u64(&entry_buf[32..40]);
                let size = read_u32(&entry_buf[40..44]);

                index.insert(ContentRef::from_bytes(ref_bytes), IndexEntry { offset, size });
            }
        }

        debug!(path = %path.display(), chunks = index.len(), root = %root.short(), "opened chunk store");

        Ok(FileStore {
            path,
            config,
            file: Mutex::new(file),
            index: RwLock::new(index),
            root: Mutex::new(root),
            tail: Mutex::new(Tail::fresh(end, index_offset)),
        })
    }

    /// Open or create a store file
    pub fn open_or_create(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open_with(path, config)
        } else {
            Self::create_with(path, config)
        }
    }

    /// Flush the index and header to disk
    pub fn sync(&self) -> Result<()> {
        let root = self.root.lock();
        self.persist(*root)
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Append an index if frames are pending, then point the header at it
    /// together with `root`.
    ///
    /// Lock order is root (held by the caller), tail, index, file; `put`
    /// takes the same order minus root.
    fn persist(&self, root: ContentRef) -> Result<()> {
        let mut tail = self.tail.lock();
        let index = self.index.read();
        let mut file = self.file.lock();

        let mut next = *tail;
        if tail.has_unindexed_frames() {
            // Sort by ref for determinism
            let mut entries: Vec<_> = index.iter().collect();
            entries.sort_by_key(|(r, _)| *r);

            let mut buf = Vec::with_capacity(entries.len() * INDEX_ENTRY_SIZE);
            for (content_ref, entry) in entries {
                buf.extend_from_slice(content_ref.as_bytes());
                buf.extend_from_slice(&entry.offset.to_le_bytes());
                buf.extend_from_slice(&entry.size.to_le_bytes());
            }

            file.seek(SeekFrom::Start(tail.end))?;
            file.write_all(&buf)?;
            // Frames and index must be on disk before the header names them
            file.sync_data()?;

            next.index_offset = tail.end;
            next.end = tail.end + buf.len() as u64;
            next.synced_end = next.end;
        }

        let mut header = [0u8; (HEADER_SIZE - COUNT_OFFSET) as usize];
        header[0..8].copy_from_slice(&(index.len() as u64).to_le_bytes());
        header[8..16].copy_from_slice(&next.index_offset.to_le_bytes());
        header[16..48].copy_from_slice(root.as_bytes());

        file.seek(SeekFrom::Start(COUNT_OFFSET))?;
        file.write_all(&header)?;
        file.sync_data()?;

        *tail = next;
        debug!(chunks = index.len(), root = %root.short(), "chunk store synced");
        Ok(())
    }

    fn read_frame(&self, entry: IndexEntry) -> Result<Vec<u8>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(entry.offset))?;
        let mut data = vec![0u8; entry.size as usize];
        file.read_exact(&mut data)?;
        Ok(data)
    }
}

impl ChunkStore for FileStore {
    fn get(&self, content_ref: &ContentRef) -> Result<Option<Chunk>> {
        let entry = self.index.read().get(content_ref).copied();
        let Some(entry) = entry else {
            return Ok(None);
        };

        let data = frame::decode(&self.read_frame(entry)?)?;
        if self.config.verify_reads {
            let actual = ContentRef::of(&data);
            if actual != *content_ref {
                return Err(Error::Corruption(format!(
                    "Chunk {} hashes to {}",
                    content_ref, actual
                )));
            }
        }

        Ok(Some(Chunk::from_parts(*content_ref, data)))
    }

    fn has(&self, content_ref: &ContentRef) -> Result<bool> {
        Ok(self.index.read().contains_key(content_ref))
    }

    fn put(&self, chunk: Chunk) -> Result<ContentRef> {
        let content_ref = chunk.content_ref();

        if self.index.read().contains_key(&content_ref) {
            return Ok(content_ref);
        }

        let encoded = frame::encode(chunk.data(), self.config.compression_level)?;
        let size = u32::try_from(encoded.len())
            .map_err(|_| Error::Corruption(format!("Chunk {} too large", content_ref)))?;

        let mut tail = self.tail.lock();
        // A racing writer may have stored the same bytes meanwhile
        if self.index.read().contains_key(&content_ref) {
            return Ok(content_ref);
        }

        let offset = tail.end;
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&encoded)?;
        }
        tail.end = offset + size as u64;

        self.index
            .write()
            .insert(content_ref, IndexEntry { offset, size });

        Ok(content_ref)
    }

    fn root(&self) -> ContentRef {
        *self.root.lock()
    }

    fn update_root(&self, new_root: ContentRef, expected: ContentRef) -> Result<bool> {
        let mut root = self.root.lock();
        if *root != expected {
            debug!(expected = %expected.short(), actual = %root.short(), "root update rejected");
            return Ok(false);
        }

        self.persist(new_root)?;
        *root = new_root;
        Ok(true)
    }

    fn len(&self) -> usize {
        self.index.read().len()
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            warn!(path = %self.path.display(), error = %e, "failed to sync chunk store on drop");
        }
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, FileStore) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.chunks");
        let store = FileStore::create(&path).unwrap();
        (dir, store)
    }

    #[test]
    fn test_create_and_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.chunks");

        {
            let store = FileStore::create(&path).unwrap();
            assert_eq!(store.len(), 0);
            assert!(store.root().is_zero());
        }

        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.len(), 0);
        }
    }

    #[test]
    fn test_put_and_get() {
        let (_dir, store) = setup();

        let mut writer = store.begin_put();
        writer.append(b"The cat sat on the mat");
        let r = writer.commit().unwrap();

        let chunk = store.get(&r).unwrap().unwrap();
        assert_eq!(chunk.data(), b"The cat sat on the mat");
        assert_eq!(chunk.content_ref(), r);
        assert!(store.get(&ContentRef::of(b"nope")).unwrap().is_none());
    }

    #[test]
    fn test_deduplication() {
        let (_dir, store) = setup();

        let r1 = store.put(Chunk::new(b"duplicate data".to_vec())).unwrap();
        let r2 = store.put(Chunk::new(b"duplicate data".to_vec())).unwrap();

        assert_eq!(r1, r2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.chunks");

        let (r, root);
        {
            let store = FileStore::create(&path).unwrap();
            r = store.put(Chunk::new(b"persistent chunk".to_vec())).unwrap();
            root = store.put(Chunk::new(b"root chunk".to_vec())).unwrap();
            assert!(store.update_root(root, ContentRef::ZERO).unwrap());
            store.sync().unwrap();
        }

        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.len(), 2);
            assert_eq!(store.root(), root);
            assert_eq!(store.get(&r).unwrap().unwrap().data(), b"persistent chunk");

            // Appending after reopen must not clobber the old index region
            let r3 = store.put(Chunk::new(b"third".to_vec())).unwrap();
            store.sync().unwrap();
            assert_eq!(store.get(&r3).unwrap().unwrap().data(), b"third");
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_root_survives_without_sync() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.chunks");

        let root = {
            let store = FileStore::create(&path).unwrap();
            let root = store.put(Chunk::new(b"some root".to_vec())).unwrap();
            assert!(store.update_root(root, ContentRef::ZERO).unwrap());
            assert!(!store.update_root(ContentRef::ZERO, ContentRef::of(b"stale")).unwrap());
            std::mem::forget(store);
            root
        };

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.root(), root);
        assert_eq!(store.get(&root).unwrap().unwrap().data(), b"some root");
    }

    #[test]
    fn test_crash_after_reopen_keeps_old_and_new_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.chunks");

        let old = {
            let store = FileStore::create(&path).unwrap();
            let old = store.put(Chunk::new(b"synced before".to_vec())).unwrap();
            store.sync().unwrap();
            old
        };

        let new_root = {
            let store = FileStore::open(&path).unwrap();
            let new_root = store.put(Chunk::new(b"written after reopen".to_vec())).unwrap();
            assert!(store.update_root(new_root, ContentRef::ZERO).unwrap());
            // No sync on drop: the process dies here
            std::mem::forget(store);
            new_root
        };

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.root(), new_root);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&old).unwrap().unwrap().data(), b"synced before");
        assert_eq!(
            store.get(&new_root).unwrap().unwrap().data(),
            b"written after reopen"
        );
    }

    #[test]
    fn test_crash_loses_only_unsynced_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.chunks");

        let (kept, lost) = {
            let store = FileStore::create(&path).unwrap();
            let kept = store.put(Chunk::new(b"kept".to_vec())).unwrap();
            store.sync().unwrap();
            let lost = store.put(Chunk::new(b"never indexed".to_vec())).unwrap();
            std::mem::forget(store);
            (kept, lost)
        };

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&kept).unwrap().unwrap().data(), b"kept");
        assert!(store.get(&lost).unwrap().is_none());

        // The orphaned frame is skipped over, not reused
        let again = store.put(Chunk::new(b"after the crash".to_vec())).unwrap();
        store.sync().unwrap();
        assert_eq!(store.get(&kept).unwrap().unwrap().data(), b"kept");
        assert_eq!(store.get(&again).unwrap().unwrap().data(), b"after the crash");
    }

    #[test]
    fn test_repeated_syncs_keep_index_readable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.chunks");

        let refs: Vec<_> = {
            let store = FileStore::create(&path).unwrap();
            (0..4u8)
                .map(|i| {
                    let r = store.put(Chunk::new(vec![i; 16])).unwrap();
                    store.sync().unwrap();
                    let synced_len = std::fs::metadata(&path).unwrap().len();
                    // A clean sync appends nothing
                    store.sync().unwrap();
                    assert_eq!(std::fs::metadata(&path).unwrap().len(), synced_len);
                    r
                })
                .collect()
        };

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.len(), refs.len());
        for (i, r) in refs.iter().enumerate() {
            assert_eq!(store.get(r).unwrap().unwrap().data(), vec![i as u8; 16].as_slice());
        }
    }

    #[test]
    fn test_uncompressed_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.chunks");
        let config = StoreConfig {
            compression_level: 0,
            ..StoreConfig::default()
        };
        let store = FileStore::create_with(&path, config).unwrap();

        let r = store.put(Chunk::new(b"raw bytes".to_vec())).unwrap();
        assert_eq!(store.get(&r).unwrap().unwrap().data(), b"raw bytes");
    }

    #[test]
    fn test_corruption_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.chunks");
        let config = StoreConfig {
            compression_level: 0,
            ..StoreConfig::default()
        };

        let r = {
            let store = FileStore::create_with(&path, config.clone()).unwrap();
            let r = store.put(Chunk::new(b"pristine".to_vec())).unwrap();
            store.sync().unwrap();
            r
        };

        // Flip a payload byte: header, then codec byte, then data
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[HEADER_SIZE as usize + 1] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        let store = FileStore::open_with(&path, config).unwrap();
        assert!(matches!(store.get(&r), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_unverified_read_returns_stored_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.chunks");
        let config = StoreConfig {
            compression_level: 0,
            verify_reads: false,
            ..StoreConfig::default()
        };

        let r = {
            let store = FileStore::create_with(&path, config.clone()).unwrap();
            let r = store.put(Chunk::new(b"pristine".to_vec())).unwrap();
            store.sync().unwrap();
            r
        };

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[HEADER_SIZE as usize + 1] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        let store = FileStore::open_with(&path, config).unwrap();
        let chunk = store.get(&r).unwrap().unwrap();
        assert_eq!(chunk.content_ref(), r);
        assert_ne!(chunk.data(), b"pristine");
        assert_eq!(chunk.len(), b"pristine".len());
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foreign");
        std::fs::write(&path, vec![7u8; 128]).unwrap();

        assert!(matches!(FileStore::open(&path), Err(Error::InvalidFile(_))));
    }
}
