/// Maximum size of a single stored chunk. Larger files are split into
/// 1 MiB fragments that are compressed and deduplicated independently.
pub const CHUNK_MAX: usize = 1024 * 1024;

/// Separator written after a chunk descriptor when another one follows.
pub const PACKFILEINDEX_SEP: u16 = 0x0000;
/// Terminator written after the last chunk descriptor of an entry.
pub const PACKFILEINDEX_END: u16 = 0xFFFF;

/// Reserved pack index referring to the shared delta-common data file.
pub const DELTA_COMMON_PACK_INDEX: u16 = 0x1337;

/// One fragment of a logical file stored at `pack_offset` in a data file.
/// `compressed_size == uncompressed_size` means the fragment is stored raw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub load_flags: u32,
    pub texture_flags: u16,
    pub pack_offset: u64,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

/// One logical file in the archive: CRC, preload bytes, pack index and the
/// ordered fragment list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryBlock {
    pub crc: u32,            // CRC-32 (zlib polynomial) of the whole reconstructed file
    pub pack_index: u16,     // which data file holds the fragments
    pub preload: Vec<u8>,    // stored verbatim in the directory file
    pub fragments: Vec<ChunkDescriptor>,
    pub entry_path: String,
}

impl EntryBlock {
    /// Builds an entry block from an in-memory file, splitting everything
    /// past the preload bytes into 1 MiB fragments. Pack offsets and
    /// compressed sizes are placeholders until the chunks are stored.
    pub fn from_file_data(
        data: &[u8],
        preload_size: u16,
        pack_index: u16,
        load_flags: u32,
        texture_flags: u16,
        entry_path: &str,
    ) -> Self {
        let crc = crc32fast::hash(data);

        let preload = if preload_size > 0 && preload_size as usize <= data.len() {
            data[..preload_size as usize].to_vec()
        } else {
            Vec::new()
        };

        let mut fragments = Vec::new();
        let mut remaining = data.len() - preload.len();
        while remaining > 0 {
            let size = remaining.min(CHUNK_MAX) as u64;
            fragments.push(ChunkDescriptor {
                load_flags,
                texture_flags,
                pack_offset: 0,
                compressed_size: size,
                uncompressed_size: size,
            });
            remaining -= size as usize;
        }

        Self {
            crc,
            pack_index,
            preload,
            fragments,
            entry_path: entry_path.to_string(),
        }
    }

    pub fn preload_size(&self) -> u16 {
        self.preload.len() as u16
    }

    /// Size of the file this entry reconstructs to.
    pub fn uncompressed_len(&self) -> u64 {
        self.preload.len() as u64
            + self
                .fragments
                .iter()
                .map(|f| f.uncompressed_size)
                .sum::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_into_one_mib_fragments() {
        let data = vec![0xABu8; CHUNK_MAX + 1];
        let block = EntryBlock::from_file_data(&data, 0, 0, 3, 0, "big.bin");
        assert_eq!(block.fragments.len(), 2);
        assert_eq!(block.fragments[0].uncompressed_size, CHUNK_MAX as u64);
        assert_eq!(block.fragments[1].uncompressed_size, 1);
        assert_eq!(block.uncompressed_len(), data.len() as u64);
    }

    #[test]
    fn exact_boundary_is_one_fragment() {
        let data = vec![0u8; CHUNK_MAX];
        let block = EntryBlock::from_file_data(&data, 0, 0, 3, 0, "even.bin");
        assert_eq!(block.fragments.len(), 1);
        assert_eq!(block.fragments[0].uncompressed_size, CHUNK_MAX as u64);
    }

    #[test]
    fn preload_is_carved_off_the_front() {
        let data = b"preload-then-body".to_vec();
        let block = EntryBlock::from_file_data(&data, 7, 0, 3, 0, "p.bin");
        assert_eq!(block.preload, b"preload");
        assert_eq!(block.fragments.len(), 1);
        assert_eq!(block.fragments[0].uncompressed_size, (data.len() - 7) as u64);
        assert_eq!(block.crc, crc32fast::hash(&data));
    }

    #[test]
    fn oversized_preload_is_ignored() {
        let data = b"tiny".to_vec();
        let block = EntryBlock::from_file_data(&data, 100, 0, 3, 0, "t.bin");
        assert!(block.preload.is_empty());
        assert_eq!(block.fragments.len(), 1);
    }

    #[test]
    fn empty_file_has_no_fragments() {
        let block = EntryBlock::from_file_data(&[], 0, 0, 3, 0, "empty.bin");
        assert!(block.fragments.is_empty());
        assert_eq!(block.uncompressed_len(), 0);
    }
}
