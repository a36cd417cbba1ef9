//! Unpacking pipelines: single-locale extraction, CRC-based locale
//! differencing and the multi-locale driver that discovers sibling
//! directory files.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{error, info};
use rayon::prelude::*;

use crate::vpk::codec;
use crate::vpk::entry::EntryBlock;
use crate::vpk::error::{Result, VpkError};
use crate::vpk::locale::{self, KNOWN_LOCALES};
use crate::vpk::manifest;
use crate::vpk::pack::worker_pool;
use crate::vpk::VpkDir;

#[derive(Debug, Default)]
pub struct UnpackSummary {
    pub files_extracted: usize,
    pub failures: usize,
}

impl UnpackSummary {
    fn absorb(&mut self, other: UnpackSummary) {
        self.files_extracted += other.files_extracted;
        self.failures += other.failures;
    }
}

/// Extracts one entry block: preload bytes first, then each fragment read
/// from its data file and decoded. Fragment decode errors are logged and
/// skipped so the remaining fragments still land.
fn extract_block(dir: &VpkDir, block: &EntryBlock, out_root: &Path) -> Result<()> {
    let dir_parent = dir.dir_path.parent().unwrap_or_else(|| Path::new(""));
    let pack_path = dir_parent.join(dir.pack_file_name_for_index(block.pack_index));
    let mut pack_file = File::open(&pack_path)?;

    let out_path = out_root.join(&block.entry_path);
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = File::create(&out_path)?;
    out.write_all(&block.preload)?;

    for frag in &block.fragments {
        // Placeholder reference with no primary data in this pack file.
        if frag.pack_offset == 0 && frag.compressed_size == 0 {
            continue;
        }

        pack_file.seek(SeekFrom::Start(frag.pack_offset))?;
        let mut stored = vec![0u8; frag.compressed_size as usize];
        pack_file.read_exact(&mut stored)?;

        match codec::decode_chunk(&stored, frag.uncompressed_size) {
            Ok(bytes) => out.write_all(&bytes)?,
            Err(e) => error!("failed to decode a fragment of {}: {e}", block.entry_path),
        }
    }

    Ok(())
}

/// Parallel extraction of every entry accepted by the filter. Each task
/// owns its own data-file and output handles.
fn extract_entries<F>(
    dir: &VpkDir,
    out_root: &Path,
    num_threads: i32,
    filter: F,
) -> Result<UnpackSummary>
where
    F: Fn(&EntryBlock) -> bool + Sync,
{
    let pool = worker_pool(num_threads)?;
    let extracted = AtomicUsize::new(0);
    let failures = AtomicUsize::new(0);

    pool.install(|| {
        dir.entries
            .par_iter()
            .filter(|block| filter(block))
            .for_each(|block| match extract_block(dir, block, out_root) {
                Ok(()) => {
                    extracted.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    error!("failed to extract {}: {e}", block.entry_path);
                    failures.fetch_add(1, Ordering::Relaxed);
                }
            });
    });

    Ok(UnpackSummary {
        files_extracted: extracted.load(Ordering::Relaxed),
        failures: failures.load(Ordering::Relaxed),
    })
}

/// Unpacks a whole archive into `out_path` and re-exports its build
/// manifest under `<out_path>/manifest/`.
pub fn unpack_store(dir: &VpkDir, out_path: &Path, num_threads: i32) -> Result<UnpackSummary> {
    fs::create_dir_all(out_path)?;
    let manifest_dir = out_path.join("manifest");
    fs::create_dir_all(&manifest_dir)?;

    let base = locale::dir_base_name(dir.file_name()).to_string();
    manifest::write_manifest(
        &manifest_dir.join(format!("{base}.vdf")),
        &manifest::manifest_from_dir(dir),
    )?;

    let summary = extract_entries(dir, out_path, num_threads, |_| true)?;
    info!(
        "Unpacked {} files from {} ({} failures)",
        summary.files_extracted,
        dir.file_name(),
        summary.failures
    );
    Ok(summary)
}

/// Differencing unpack: extracts only the entries whose CRC differs from
/// the fallback (typically English) directory, so a locale tree carries
/// just its own overrides.
pub fn unpack_store_differences(
    fallback_dir: &VpkDir,
    other_dir: &VpkDir,
    lang_out_path: &Path,
    num_threads: i32,
) -> Result<UnpackSummary> {
    let fallback_crcs: HashMap<&str, u32> = fallback_dir
        .entries
        .iter()
        .map(|b| (b.entry_path.as_str(), b.crc))
        .collect();

    extract_entries(other_dir, lang_out_path, num_threads, |block| {
        fallback_crcs.get(block.entry_path.as_str()) != Some(&block.crc)
    })
}

/// Finds every sibling locale directory sharing the given directory file's
/// base name, keyed by locale.
fn discover_locale_dirs(any_dir_file: &Path) -> Result<BTreeMap<String, VpkDir>> {
    let file_name = any_dir_file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| VpkError::MissingSource(any_dir_file.to_path_buf()))?;
    let base = locale::strip_locale_prefix(file_name);
    let parent = any_dir_file.parent().unwrap_or_else(|| Path::new(""));

    let mut dirs = BTreeMap::new();
    for loc in KNOWN_LOCALES {
        let candidate = parent.join(format!("{loc}{base}"));
        if candidate.is_file() {
            dirs.insert(loc.to_string(), VpkDir::open(&candidate)?);
        }
    }
    Ok(dirs)
}

/// Multi-locale unpack: the fallback locale (English when present) is
/// extracted in full, every other locale is differenced against it, and a
/// multi-locale manifest covering the union is written.
pub fn unpack_store_multi(
    any_dir_file: &Path,
    out_path: &Path,
    sanitize: bool,
    num_threads: i32,
) -> Result<UnpackSummary> {
    let dir_file: PathBuf = if sanitize {
        locale::sanitize_dir_path(any_dir_file)
    } else {
        any_dir_file.to_path_buf()
    };

    let language_dirs = discover_locale_dirs(&dir_file)?;
    if language_dirs.is_empty() {
        return Err(VpkError::MissingSource(dir_file));
    }

    let fallback_locale = if language_dirs.contains_key("english") {
        "english".to_string()
    } else {
        language_dirs.keys().next().cloned().unwrap()
    };
    info!(
        "Unpacking {} locales with {} as fallback",
        language_dirs.len(),
        fallback_locale
    );

    let fallback_dir = &language_dirs[&fallback_locale];
    let content_root = out_path.join("content");

    let mut summary = UnpackSummary::default();
    summary.absorb(extract_entries(
        fallback_dir,
        &content_root.join(&fallback_locale),
        num_threads,
        |_| true,
    )?);

    for (loc, dir) in &language_dirs {
        if *loc == fallback_locale {
            continue;
        }
        summary.absorb(unpack_store_differences(
            fallback_dir,
            dir,
            &content_root.join(loc),
            num_threads,
        )?);
    }

    let manifest_dir = out_path.join("manifest");
    fs::create_dir_all(&manifest_dir)?;
    manifest::build_multi_lang_manifest(
        &language_dirs,
        &manifest_dir.join(manifest::MULTI_MANIFEST_FILE),
    )?;

    info!(
        "Unpacked {} files across {} locales ({} failures)",
        summary.files_extracted,
        language_dirs.len(),
        summary.failures
    );
    Ok(summary)
}

/// One row of an `ls` listing: entry path and reconstructed size.
pub fn list_entries(dir: &VpkDir) -> Vec<(String, u64)> {
    dir.entries
        .iter()
        .map(|b| (b.entry_path.clone(), b.uncompressed_len()))
        .collect()
}
