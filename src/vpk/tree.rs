//! Serialization of the directory tree: extension -> path -> filename, with
//! embedded chunk descriptors. All integers are packed little-endian.

use std::collections::BTreeMap;

use crate::vpk::entry::{ChunkDescriptor, EntryBlock, PACKFILEINDEX_END, PACKFILEINDEX_SEP};
use crate::vpk::error::{Result, VpkError};

/// Path sentinel for entries that live at the archive root.
const ROOT_PATH_SENTINEL: &str = " ";

struct TreeReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> TreeReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(VpkError::Truncated(what.to_string()));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u16(&mut self, what: &str) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2, what)?.try_into().unwrap()))
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4, what)?.try_into().unwrap()))
    }

    fn read_u64(&mut self, what: &str) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8, what)?.try_into().unwrap()))
    }

    fn read_cstr(&mut self, what: &str) -> Result<String> {
        let start = self.pos;
        while self.pos < self.buf.len() && self.buf[self.pos] != 0 {
            self.pos += 1;
        }
        if self.pos >= self.buf.len() {
            return Err(VpkError::Truncated(what.to_string()));
        }
        let s = String::from_utf8_lossy(&self.buf[start..self.pos]).into_owned();
        self.pos += 1; // consume the NUL
        Ok(s)
    }
}

/// Parses the tree section (everything after the 16-byte header) into a
/// flat list of entry blocks, in file order.
pub fn parse_tree(buf: &[u8]) -> Result<Vec<EntryBlock>> {
    let mut reader = TreeReader::new(buf);
    let mut entries = Vec::new();

    loop {
        let ext = reader.read_cstr("extension name")?;
        if ext.is_empty() {
            break;
        }

        loop {
            let path = reader.read_cstr("path name")?;
            if path.is_empty() {
                break;
            }
            let path = if path == ROOT_PATH_SENTINEL { "" } else { path.as_str() };

            loop {
                let filename = reader.read_cstr("file name")?;
                if filename.is_empty() {
                    break;
                }

                let mut entry_path = String::new();
                if !path.is_empty() {
                    entry_path.push_str(path);
                    if !entry_path.ends_with('/') {
                        entry_path.push('/');
                    }
                }
                entry_path.push_str(&filename);
                if !ext.is_empty() {
                    entry_path.push('.');
                    entry_path.push_str(&ext);
                }

                let crc = reader.read_u32("entry CRC")?;
                let preload_size = reader.read_u16("preload size")?;
                let pack_index = reader.read_u16("pack file index")?;
                let preload = reader.take(preload_size as usize, "preload bytes")?.to_vec();

                let mut fragments = Vec::new();
                loop {
                    let descriptor = ChunkDescriptor {
                        load_flags: reader.read_u32("fragment load flags")?,
                        texture_flags: reader.read_u16("fragment texture flags")?,
                        pack_offset: reader.read_u64("fragment pack offset")?,
                        compressed_size: reader.read_u64("fragment compressed size")?,
                        uncompressed_size: reader.read_u64("fragment uncompressed size")?,
                    };
                    fragments.push(descriptor);

                    if reader.read_u16("fragment terminator")? == PACKFILEINDEX_END {
                        break;
                    }
                }

                entries.push(EntryBlock {
                    crc,
                    pack_index,
                    preload,
                    fragments,
                    entry_path,
                });
            }
        }
    }

    Ok(entries)
}

/// Splits an entry path into `(extension, directory, stem)`. The last '.'
/// of the file name yields the extension; the last '/' yields the path.
pub fn split_entry_path(entry_path: &str) -> (&str, &str, &str) {
    let (dir, name) = match entry_path.rfind('/') {
        Some(pos) => (&entry_path[..pos], &entry_path[pos + 1..]),
        None => ("", entry_path),
    };
    let (stem, ext) = match name.rfind('.') {
        Some(pos) => (&name[..pos], &name[pos + 1..]),
        None => (name, ""),
    };
    (ext, dir, stem)
}

/// Serializes entry blocks into the tree section, including the final
/// terminator byte. Extensions and paths are emitted in sorted order so the
/// output is deterministic; entries keep their order within a group.
pub fn serialize_tree(entries: &[EntryBlock]) -> Vec<u8> {
    let mut tree: BTreeMap<&str, BTreeMap<&str, Vec<&EntryBlock>>> = BTreeMap::new();
    for block in entries {
        let (ext, dir, _) = split_entry_path(&block.entry_path);
        let dir = if dir.is_empty() { ROOT_PATH_SENTINEL } else { dir };
        tree.entry(ext).or_default().entry(dir).or_default().push(block);
    }

    let mut out = Vec::new();
    for (ext, paths) in &tree {
        out.extend_from_slice(ext.as_bytes());
        out.push(0);

        for (path, blocks) in paths {
            out.extend_from_slice(path.as_bytes());
            out.push(0);

            for block in blocks {
                let (_, _, stem) = split_entry_path(&block.entry_path);
                out.extend_from_slice(stem.as_bytes());
                out.push(0);

                out.extend_from_slice(&block.crc.to_le_bytes());
                out.extend_from_slice(&block.preload_size().to_le_bytes());
                out.extend_from_slice(&block.pack_index.to_le_bytes());
                out.extend_from_slice(&block.preload);

                for (i, frag) in block.fragments.iter().enumerate() {
                    out.extend_from_slice(&frag.load_flags.to_le_bytes());
                    out.extend_from_slice(&frag.texture_flags.to_le_bytes());
                    out.extend_from_slice(&frag.pack_offset.to_le_bytes());
                    out.extend_from_slice(&frag.compressed_size.to_le_bytes());
                    out.extend_from_slice(&frag.uncompressed_size.to_le_bytes());

                    let marker = if i + 1 < block.fragments.len() {
                        PACKFILEINDEX_SEP
                    } else {
                        PACKFILEINDEX_END
                    };
                    out.extend_from_slice(&marker.to_le_bytes());
                }
            }
            out.push(0); // end of filenames under this path
        }
        out.push(0); // end of paths under this extension
    }
    out.push(0); // end of extensions
    out
}
