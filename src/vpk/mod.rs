pub mod codec;
pub mod entry;
pub mod error;
pub mod fingerprint;
pub mod header;
pub mod locale;
pub mod manifest;
pub mod pack;
pub mod store;
pub mod tree;
pub mod unpack;

use std::collections::BTreeSet;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use log::info;

use entry::EntryBlock;
use error::{Result, VpkError};
use header::VpkDirHeader;

/// A parsed (or freshly built) VPK directory file: the header plus every
/// entry block and the set of data files they reference.
#[derive(Debug, Clone)]
pub struct VpkDir {
    pub header: VpkDirHeader,
    pub dir_path: PathBuf,
    pub entries: Vec<EntryBlock>,
    pub pack_indices: BTreeSet<u16>,
}

impl VpkDir {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let buf = fs::read(path)?;

        if buf.len() < VpkDirHeader::SIZE {
            return Err(VpkError::Truncated("directory header".to_string()));
        }
        let header = VpkDirHeader::read(&mut Cursor::new(&buf))
            .map_err(|_| VpkError::Truncated("directory header".to_string()))?;
        if !header.is_valid() {
            return Err(VpkError::BadHeader(path.display().to_string()));
        }

        let entries = tree::parse_tree(&buf[VpkDirHeader::SIZE..])?;
        let pack_indices = entries.iter().map(|e| e.pack_index).collect();

        Ok(Self {
            header,
            dir_path: path.to_path_buf(),
            entries,
            pack_indices,
        })
    }

    /// Opens a directory file, optionally substituting "pak000_NNN" data
    /// file paths with the corresponding "_dir" file first.
    pub fn open_with_sanitize<P: AsRef<Path>>(path: P, sanitize: bool) -> Result<Self> {
        let path = path.as_ref();
        if !sanitize {
            return Self::open(path);
        }
        let fixed = locale::sanitize_dir_path(path);
        if fixed.as_path() != path && !fixed.is_file() {
            return Err(VpkError::MissingSource(fixed));
        }
        Self::open(fixed)
    }

    /// File name of the directory file itself.
    pub fn file_name(&self) -> &str {
        self.dir_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Name of the data file a pack index refers to, relative to the
    /// directory file's parent.
    pub fn pack_file_name_for_index(&self, pack_index: u16) -> String {
        locale::pack_file_name_for_index(self.file_name(), pack_index)
    }

    /// Serializes entry blocks into a directory file on disk. The header's
    /// directory size covers the whole tree section including terminators.
    pub fn build_directory_file(directory_path: &Path, entry_blocks: &[EntryBlock]) -> Result<()> {
        let tree_bytes = tree::serialize_tree(entry_blocks);

        let mut cursor = Cursor::new(Vec::with_capacity(VpkDirHeader::SIZE + tree_bytes.len()));
        VpkDirHeader::new(tree_bytes.len() as u32)
            .write(&mut cursor)
            .map_err(|e| VpkError::Io(std::io::Error::other(e)))?;
        let mut bytes = cursor.into_inner();
        bytes.extend_from_slice(&tree_bytes);

        fs::write(directory_path, bytes)?;
        info!(
            "Directory built at {} with {} entries",
            directory_path.display(),
            entry_blocks.len()
        );
        Ok(())
    }
}
