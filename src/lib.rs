pub mod vpk;

pub use vpk::codec::{CompressionMethod, ZSTD_MARKER, ZSTD_MARKER_LEN};
pub use vpk::entry::{ChunkDescriptor, EntryBlock, CHUNK_MAX, DELTA_COMMON_PACK_INDEX};
pub use vpk::error::{Result, VpkError};
pub use vpk::fingerprint::fingerprint;
pub use vpk::header::VpkDirHeader;
pub use vpk::locale::{VpkPair, KNOWN_LOCALES};
pub use vpk::manifest::ManifestEntry;
pub use vpk::pack::{pack_delta_common, pack_store, pack_store_multi, PackOptions, PackSummary};
pub use vpk::store::ChunkStore;
pub use vpk::unpack::{
    list_entries, unpack_store, unpack_store_differences, unpack_store_multi, UnpackSummary,
};
pub use vpk::VpkDir;
