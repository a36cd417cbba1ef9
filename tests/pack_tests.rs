use std::fs;
use std::path::Path;

use revpk::vpk::manifest::{self, ManifestEntry};
use revpk::{
    pack_store, unpack_store, CompressionMethod, PackOptions, VpkDir, CHUNK_MAX, ZSTD_MARKER,
};

fn write_source(workspace: &Path, locale: &str, entry_path: &str, data: &[u8]) {
    let path = workspace.join("content").join(locale).join(entry_path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, data).unwrap();
}

fn write_manifest(workspace: &Path, base: &str, entries: &[ManifestEntry]) {
    let dir = workspace.join("manifest");
    fs::create_dir_all(&dir).unwrap();
    manifest::write_manifest(&dir.join(format!("{base}.vdf")), entries).unwrap();
}

fn opts(workspace: &Path, build: &Path, method: CompressionMethod) -> PackOptions {
    PackOptions {
        workspace: workspace.to_path_buf(),
        build_path: build.to_path_buf(),
        num_threads: 2,
        method,
    }
}

fn plain_entry(path: &str) -> ManifestEntry {
    ManifestEntry {
        use_compression: false,
        ..ManifestEntry::new(path)
    }
}

/// Deterministic, incompressible-ish filler.
fn pseudo_random(len: usize) -> Vec<u8> {
    let mut state = 0x2545F4914F6CDD1Du64;
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        out.extend_from_slice(&state.to_le_bytes());
    }
    out.truncate(len);
    out
}

#[test]
fn single_tiny_file() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = tmp.path().join("ship");
    let build = tmp.path().join("vpk");

    write_source(&ws, "english", "a/b.txt", b"hello");
    write_manifest(&ws, "englishclient_mp_test", &[plain_entry("a/b.txt")]);

    let summary = pack_store(
        "english",
        "client",
        "mp_test",
        &opts(&ws, &build, CompressionMethod::default()),
    )
    .unwrap();
    assert_eq!(summary.files_packed, 1);
    assert_eq!(summary.failures, 0);

    let dir = VpkDir::open(build.join("englishclient_mp_test.bsp.pak000_dir.vpk")).unwrap();
    assert_eq!(dir.entries.len(), 1);
    let entry = &dir.entries[0];
    assert_eq!(entry.entry_path, "a/b.txt");
    assert_eq!(entry.fragments.len(), 1);
    assert_eq!(entry.fragments[0].compressed_size, 5);
    assert_eq!(entry.fragments[0].uncompressed_size, 5);
    assert_eq!(entry.fragments[0].pack_offset, 0);
    assert_eq!(entry.crc, crc32fast::hash(b"hello"));

    let data = fs::read(build.join("client_mp_test.bsp.pak000_000.vpk")).unwrap();
    assert_eq!(data, b"hello");
}

#[test]
fn chunk_boundaries() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = tmp.path().join("ship");
    let build = tmp.path().join("vpk");

    write_source(&ws, "english", "even.bin", &pseudo_random(CHUNK_MAX));
    write_source(&ws, "english", "odd.bin", &pseudo_random(CHUNK_MAX + 1));
    write_manifest(
        &ws,
        "englishclient_mp_test",
        &[plain_entry("even.bin"), plain_entry("odd.bin")],
    );

    pack_store(
        "english",
        "client",
        "mp_test",
        &opts(&ws, &build, CompressionMethod::default()),
    )
    .unwrap();

    let dir = VpkDir::open(build.join("englishclient_mp_test.bsp.pak000_dir.vpk")).unwrap();

    let even = dir.entries.iter().find(|e| e.entry_path == "even.bin").unwrap();
    assert_eq!(even.fragments.len(), 1);
    assert_eq!(even.fragments[0].uncompressed_size, CHUNK_MAX as u64);

    let odd = dir.entries.iter().find(|e| e.entry_path == "odd.bin").unwrap();
    assert_eq!(odd.fragments.len(), 2);
    assert_eq!(odd.fragments[0].uncompressed_size, CHUNK_MAX as u64);
    assert_eq!(odd.fragments[1].uncompressed_size, 1);

    // All fragments obey the size law.
    for entry in &dir.entries {
        for frag in &entry.fragments {
            assert!(frag.compressed_size <= frag.uncompressed_size);
            assert!(frag.uncompressed_size <= CHUNK_MAX as u64);
        }
        for frag in &entry.fragments[..entry.fragments.len() - 1] {
            assert_eq!(frag.uncompressed_size, CHUNK_MAX as u64);
        }
    }
}

#[test]
fn identical_files_share_chunks() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = tmp.path().join("ship");
    let build = tmp.path().join("vpk");

    let payload = b"identical payload shared across two entries";
    write_source(&ws, "english", "copies/first.bin", payload);
    write_source(&ws, "english", "copies/second.bin", payload);
    write_manifest(
        &ws,
        "englishclient_mp_test",
        &[plain_entry("copies/first.bin"), plain_entry("copies/second.bin")],
    );

    let summary = pack_store(
        "english",
        "client",
        "mp_test",
        &opts(&ws, &build, CompressionMethod::default()),
    )
    .unwrap();
    assert_eq!(summary.shared_chunks, 1);
    assert_eq!(summary.shared_bytes, payload.len() as u64);

    let dir = VpkDir::open(build.join("englishclient_mp_test.bsp.pak000_dir.vpk")).unwrap();
    let first = dir.entries.iter().find(|e| e.entry_path == "copies/first.bin").unwrap();
    let second = dir.entries.iter().find(|e| e.entry_path == "copies/second.bin").unwrap();
    assert_eq!(first.fragments[0].pack_offset, second.fragments[0].pack_offset);
    assert_eq!(first.fragments[0].compressed_size, second.fragments[0].compressed_size);

    let data = fs::read(build.join("client_mp_test.bsp.pak000_000.vpk")).unwrap();
    assert_eq!(data.len(), payload.len());
}

#[test]
fn dedup_is_pre_codec() {
    // Two identical sources, one packed with compression: both entries
    // still share a single stored chunk.
    let tmp = tempfile::tempdir().unwrap();
    let ws = tmp.path().join("ship");
    let build = tmp.path().join("vpk");

    let payload = b"dedup dedup dedup dedup dedup dedup dedup dedup".repeat(50);
    write_source(&ws, "english", "a.bin", &payload);
    write_source(&ws, "english", "b.bin", &payload);
    write_manifest(
        &ws,
        "englishclient_mp_test",
        &[ManifestEntry::new("a.bin"), ManifestEntry::new("b.bin")],
    );

    let summary = pack_store(
        "english",
        "client",
        "mp_test",
        &opts(&ws, &build, CompressionMethod::default()),
    )
    .unwrap();
    assert_eq!(summary.shared_chunks, 1);

    let dir = VpkDir::open(build.join("englishclient_mp_test.bsp.pak000_dir.vpk")).unwrap();
    let a = dir.entries.iter().find(|e| e.entry_path == "a.bin").unwrap();
    let b = dir.entries.iter().find(|e| e.entry_path == "b.bin").unwrap();
    assert_eq!(a.fragments[0], b.fragments[0]);
    assert!(a.fragments[0].compressed_size < a.fragments[0].uncompressed_size);
}

#[test]
fn zstd_chunks_carry_the_marker_and_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = tmp.path().join("ship");
    let build = tmp.path().join("vpk");

    let payload: Vec<u8> = b"zstd-payload-".iter().copied().cycle().take(200_000).collect();
    write_source(&ws, "english", "big/compressible.bin", &payload);
    write_manifest(
        &ws,
        "englishclient_mp_test",
        &[ManifestEntry::new("big/compressible.bin")],
    );

    pack_store(
        "english",
        "client",
        "mp_test",
        &opts(&ws, &build, CompressionMethod::Zstd),
    )
    .unwrap();

    let dir = VpkDir::open(build.join("englishclient_mp_test.bsp.pak000_dir.vpk")).unwrap();
    let frag = &dir.entries[0].fragments[0];
    assert!(frag.compressed_size < frag.uncompressed_size);
    assert_eq!(frag.uncompressed_size, 200_000);

    let data = fs::read(build.join("client_mp_test.bsp.pak000_000.vpk")).unwrap();
    let stored = &data[frag.pack_offset as usize..(frag.pack_offset + 8) as usize];
    assert_eq!(stored, &ZSTD_MARKER.to_le_bytes()[..]);

    let out = tmp.path().join("unpacked");
    unpack_store(&dir, &out, 1).unwrap();
    assert_eq!(fs::read(out.join("big/compressible.bin")).unwrap(), payload);
}

#[test]
fn pack_unpack_roundtrip_is_bit_identical() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = tmp.path().join("ship");
    let build = tmp.path().join("vpk");

    let files: Vec<(&str, Vec<u8>)> = vec![
        ("scripts/vscripts/init.nut", b"function init() {}\n".to_vec()),
        ("cfg/settings.cfg", b"setting 1\nsetting 2\n".repeat(1000)),
        ("bin/blob.bin", pseudo_random(CHUNK_MAX + 4096)),
        ("noext", b"no extension here".to_vec()),
    ];

    let mut entries = Vec::new();
    for (path, data) in &files {
        write_source(&ws, "english", path, data);
        entries.push(ManifestEntry::new(*path));
    }
    write_manifest(&ws, "englishclient_mp_test", &entries);

    pack_store(
        "english",
        "client",
        "mp_test",
        &opts(&ws, &build, CompressionMethod::default()),
    )
    .unwrap();

    let dir = VpkDir::open(build.join("englishclient_mp_test.bsp.pak000_dir.vpk")).unwrap();

    // CRC agreement on the freshly written directory.
    for (path, data) in &files {
        let entry = dir.entries.iter().find(|e| e.entry_path == *path).unwrap();
        assert_eq!(entry.crc, crc32fast::hash(data), "CRC mismatch for {path}");
    }

    let out = tmp.path().join("unpacked");
    let summary = unpack_store(&dir, &out, 2).unwrap();
    assert_eq!(summary.files_extracted, files.len());
    assert_eq!(summary.failures, 0);

    for (path, data) in &files {
        assert_eq!(&fs::read(out.join(path)).unwrap(), data, "mismatch for {path}");
    }

    // The manifest is re-exported next to the content.
    let rebuilt = manifest::load_manifest(
        &out.join("manifest").join("englishclient_mp_test.vdf"),
    )
    .unwrap();
    assert_eq!(rebuilt.len(), files.len());
}

#[test]
fn preload_bytes_come_back_on_unpack() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = tmp.path().join("ship");
    let build = tmp.path().join("vpk");

    let payload = b"preloaded-header-then-the-rest-of-the-file".to_vec();
    write_source(&ws, "english", "cfg/boot.cfg", &payload);
    write_manifest(
        &ws,
        "englishclient_mp_test",
        &[ManifestEntry {
            preload_size: 16,
            use_compression: false,
            ..ManifestEntry::new("cfg/boot.cfg")
        }],
    );

    pack_store(
        "english",
        "client",
        "mp_test",
        &opts(&ws, &build, CompressionMethod::default()),
    )
    .unwrap();

    let dir = VpkDir::open(build.join("englishclient_mp_test.bsp.pak000_dir.vpk")).unwrap();
    let entry = &dir.entries[0];
    assert_eq!(entry.preload, &payload[..16]);
    assert_eq!(entry.uncompressed_len(), payload.len() as u64);

    let out = tmp.path().join("unpacked");
    unpack_store(&dir, &out, 1).unwrap();
    assert_eq!(fs::read(out.join("cfg/boot.cfg")).unwrap(), payload);
}

#[test]
fn missing_and_empty_sources_are_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = tmp.path().join("ship");
    let build = tmp.path().join("vpk");

    write_source(&ws, "english", "present.txt", b"here");
    write_source(&ws, "english", "empty.txt", b"");
    write_manifest(
        &ws,
        "englishclient_mp_test",
        &[
            plain_entry("present.txt"),
            plain_entry("empty.txt"),
            plain_entry("missing.txt"),
        ],
    );

    let summary = pack_store(
        "english",
        "client",
        "mp_test",
        &opts(&ws, &build, CompressionMethod::default()),
    )
    .unwrap();

    assert_eq!(summary.files_packed, 1);
    assert_eq!(summary.files_skipped, 2);
    assert_eq!(summary.failures, 0);

    let dir = VpkDir::open(build.join("englishclient_mp_test.bsp.pak000_dir.vpk")).unwrap();
    assert_eq!(dir.entries.len(), 1);
    assert_eq!(dir.entries[0].entry_path, "present.txt");
}

#[test]
fn ls_reports_reconstructed_sizes() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = tmp.path().join("ship");
    let build = tmp.path().join("vpk");

    write_source(&ws, "english", "a.bin", &pseudo_random(CHUNK_MAX + 100));
    write_source(&ws, "english", "b.txt", b"tiny");
    write_manifest(
        &ws,
        "englishclient_mp_test",
        &[plain_entry("a.bin"), plain_entry("b.txt")],
    );

    pack_store(
        "english",
        "client",
        "mp_test",
        &opts(&ws, &build, CompressionMethod::default()),
    )
    .unwrap();

    let dir = VpkDir::open(build.join("englishclient_mp_test.bsp.pak000_dir.vpk")).unwrap();
    let listing = revpk::list_entries(&dir);
    let a = listing.iter().find(|(p, _)| p == "a.bin").unwrap();
    let b = listing.iter().find(|(p, _)| p == "b.txt").unwrap();
    assert_eq!(a.1, (CHUNK_MAX + 100) as u64);
    assert_eq!(b.1, 4);
}
