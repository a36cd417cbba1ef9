//! Shared chunk store: an append-only data file plus the fingerprint index
//! used for content-addressed deduplication.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::vpk::entry::ChunkDescriptor;
use crate::vpk::error::Result;

/// Append-only writer over a single data file, shared by all pack workers.
///
/// Offsets are reserved with an atomic fetch-add so concurrent workers get
/// exclusive, non-overlapping ranges; the fingerprint index is guarded by
/// its own mutex whose critical section never spans I/O.
pub struct ChunkStore {
    file: Mutex<File>,
    cursor: AtomicU64,
    index: Mutex<HashMap<String, ChunkDescriptor>>,
    shared_bytes: AtomicU64,
    shared_chunks: AtomicU64,
}

impl ChunkStore {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            file: Mutex::new(file),
            cursor: AtomicU64::new(0),
            index: Mutex::new(HashMap::new()),
            shared_bytes: AtomicU64::new(0),
            shared_chunks: AtomicU64::new(0),
        })
    }

    /// Stores one chunk, deduplicating by fingerprint. A known fingerprint
    /// returns the first writer's descriptor unchanged; a new one reserves
    /// an exclusive offset, records the descriptor and writes the bytes at
    /// that position.
    pub fn put(
        &self,
        chunk_fingerprint: String,
        final_bytes: &[u8],
        template: ChunkDescriptor,
    ) -> Result<ChunkDescriptor> {
        let descriptor = {
            let mut index = self.index.lock().unwrap();
            if let Some(existing) = index.get(&chunk_fingerprint) {
                self.shared_bytes
                    .fetch_add(existing.uncompressed_size, Ordering::Relaxed);
                self.shared_chunks.fetch_add(1, Ordering::Relaxed);
                return Ok(existing.clone());
            }

            let offset = self
                .cursor
                .fetch_add(final_bytes.len() as u64, Ordering::Relaxed);
            let mut descriptor = template;
            descriptor.pack_offset = offset;
            descriptor.compressed_size = final_bytes.len() as u64;
            index.insert(chunk_fingerprint, descriptor.clone());
            descriptor
        };

        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(descriptor.pack_offset))?;
        file.write_all(final_bytes)?;
        Ok(descriptor)
    }

    /// Bytes written so far (logical length of the data file).
    pub fn len(&self) -> u64 {
        self.cursor.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Uncompressed bytes saved through deduplication.
    pub fn shared_bytes(&self) -> u64 {
        self.shared_bytes.load(Ordering::Relaxed)
    }

    /// Number of chunks that reused an existing copy.
    pub fn shared_chunks(&self) -> u64 {
        self.shared_chunks.load(Ordering::Relaxed)
    }

    pub fn finish(&self) -> Result<()> {
        self.file.lock().unwrap().flush()?;
        Ok(())
    }
}
