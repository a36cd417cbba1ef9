//! Packing pipelines: single-locale, multi-locale (one shared data file,
//! per-locale directories) and the delta-common batch variant.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use log::{error, info, warn};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::vpk::codec::CompressionMethod;
use crate::vpk::entry::{ChunkDescriptor, EntryBlock, DELTA_COMMON_PACK_INDEX};
use crate::vpk::error::{Result, VpkError};
use crate::vpk::fingerprint::fingerprint;
use crate::vpk::locale::{self, VpkPair};
use crate::vpk::manifest::{self, ManifestEntry};
use crate::vpk::store::ChunkStore;
use crate::vpk::VpkDir;

#[derive(Debug, Clone)]
pub struct PackOptions {
    pub workspace: PathBuf,
    pub build_path: PathBuf,
    /// Worker count; anything below 1 means hardware concurrency minus one.
    pub num_threads: i32,
    pub method: CompressionMethod,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("ship"),
            build_path: PathBuf::from("vpk"),
            num_threads: -1,
            method: CompressionMethod::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct PackSummary {
    pub files_packed: usize,
    pub files_skipped: usize,
    pub failures: usize,
    pub pack_size: u64,
    pub shared_bytes: u64,
    pub shared_chunks: u64,
}

pub(crate) fn worker_pool(num_threads: i32) -> Result<rayon::ThreadPool> {
    let threads = if num_threads > 0 {
        num_threads as usize
    } else {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
            .saturating_sub(1)
            .max(1)
    };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| VpkError::Io(std::io::Error::other(e)))
}

/// Source lookup: the locale's own content tree first, then English.
fn resolve_source(workspace: &Path, locale: &str, entry_path: &str) -> Option<PathBuf> {
    let primary = workspace.join("content").join(locale).join(entry_path);
    if primary.is_file() {
        return Some(primary);
    }
    let fallback = workspace.join("content").join("english").join(entry_path);
    fallback.is_file().then_some(fallback)
}

/// Packs one source file: read, carve off preload, split into chunks,
/// compress under the keep rule, deduplicate-or-append each chunk and
/// collect the returned descriptors in file order.
fn pack_entry_file(
    kv: &ManifestEntry,
    source: &Path,
    pack_index: u16,
    store: &ChunkStore,
    method: CompressionMethod,
) -> Result<EntryBlock> {
    let data = fs::read(source)?;
    if data.is_empty() {
        return Err(VpkError::EmptySource(source.to_path_buf()));
    }

    let mut block = EntryBlock::from_file_data(
        &data,
        kv.preload_size,
        pack_index,
        kv.load_flags,
        kv.texture_flags,
        &kv.entry_path,
    );

    let mut offset = block.preload.len();
    for frag in &mut block.fragments {
        let raw = &data[offset..offset + frag.uncompressed_size as usize];

        let final_bytes: Cow<[u8]> = if kv.use_compression {
            match method.compress_chunk(raw) {
                Ok(Some(encoded)) => Cow::Owned(encoded),
                Ok(None) => Cow::Borrowed(raw),
                Err(e) => {
                    warn!("compression failed for {}, storing raw: {e}", kv.entry_path);
                    Cow::Borrowed(raw)
                }
            }
        } else {
            Cow::Borrowed(raw)
        };

        let template = ChunkDescriptor {
            load_flags: kv.load_flags,
            texture_flags: kv.texture_flags,
            pack_offset: 0,
            compressed_size: 0,
            uncompressed_size: raw.len() as u64,
        };
        *frag = store.put(fingerprint(raw), &final_bytes, template)?;

        offset += raw.len();
    }

    Ok(block)
}

struct TaskCounters {
    skipped: AtomicUsize,
    failures: AtomicUsize,
}

impl TaskCounters {
    fn new() -> Self {
        Self {
            skipped: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }
}

/// Runs one pack task and records the outcome. Missing and empty sources
/// are warnings, not failures.
fn run_pack_task(
    kv: &ManifestEntry,
    locale: &str,
    pack_index: u16,
    store: &ChunkStore,
    opts: &PackOptions,
    counters: &TaskCounters,
) -> Option<EntryBlock> {
    let Some(source) = resolve_source(&opts.workspace, locale, &kv.entry_path) else {
        warn!("could not find source for {} ({locale})", kv.entry_path);
        counters.skipped.fetch_add(1, Ordering::Relaxed);
        return None;
    };

    match pack_entry_file(kv, &source, pack_index, store, opts.method) {
        Ok(block) => Some(block),
        Err(VpkError::EmptySource(path)) => {
            warn!("{} is empty, skipping", path.display());
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            None
        }
        Err(e) => {
            error!("failed to pack {}: {e}", kv.entry_path);
            counters.failures.fetch_add(1, Ordering::Relaxed);
            None
        }
    }
}

fn summarize(store: &ChunkStore, packed: usize, counters: &TaskCounters) -> PackSummary {
    PackSummary {
        files_packed: packed,
        files_skipped: counters.skipped.load(Ordering::Relaxed),
        failures: counters.failures.load(Ordering::Relaxed),
        pack_size: store.len(),
        shared_bytes: store.shared_bytes(),
        shared_chunks: store.shared_chunks(),
    }
}

/// Packs one `(locale, target, level)` archive: a single data file plus a
/// single directory file, built from the workspace manifest.
pub fn pack_store(locale: &str, target: &str, level: &str, opts: &PackOptions) -> Result<PackSummary> {
    let locale = if locale.is_empty() { "english" } else { locale };
    let pair = VpkPair::new(locale, target, level, 0);
    let base = locale::dir_base_name(&pair.dir_name).to_string();

    let manifest_path = opts.workspace.join("manifest").join(format!("{base}.vdf"));
    let build_list = manifest::load_manifest(&manifest_path)?;

    fs::create_dir_all(&opts.build_path)?;
    let store = ChunkStore::create(&opts.build_path.join(&pair.pack_name))?;

    let pool = worker_pool(opts.num_threads)?;
    let counters = TaskCounters::new();
    let blocks: Mutex<Vec<(usize, EntryBlock)>> = Mutex::new(Vec::new());

    pool.install(|| {
        build_list.par_iter().enumerate().for_each(|(i, kv)| {
            if let Some(block) = run_pack_task(kv, locale, 0, &store, opts, &counters) {
                blocks.lock().unwrap().push((i, block));
            }
        });
    });
    store.finish()?;

    let mut blocks = blocks.into_inner().unwrap();
    blocks.sort_by_key(|(i, _)| *i);
    let entry_blocks: Vec<EntryBlock> = blocks.into_iter().map(|(_, b)| b).collect();

    VpkDir::build_directory_file(&opts.build_path.join(&pair.dir_name), &entry_blocks)?;

    let summary = summarize(&store, entry_blocks.len(), &counters);
    info!(
        "Packed {} files into {} ({} bytes total, {} bytes deduplicated in {} shared chunks)",
        summary.files_packed, pair.pack_name, summary.pack_size, summary.shared_bytes,
        summary.shared_chunks
    );
    Ok(summary)
}

/// Multi-locale pack: every locale's files go through one shared chunk
/// store into one shared data file, then each locale gets its own
/// directory file. Deduplication shares bytes across locales.
pub fn pack_store_multi(target: &str, level: &str, opts: &PackOptions) -> Result<PackSummary> {
    let manifest_path = opts
        .workspace
        .join("manifest")
        .join(manifest::MULTI_MANIFEST_FILE);
    let locales = manifest::load_multi_manifest(&manifest_path)?;

    let pack_name = VpkPair::new("english", target, level, 0).pack_name;
    fs::create_dir_all(&opts.build_path)?;
    let store = ChunkStore::create(&opts.build_path.join(&pack_name))?;

    let tasks: Vec<(&str, usize, &ManifestEntry)> = locales
        .iter()
        .flat_map(|(locale, entries)| {
            entries
                .iter()
                .enumerate()
                .map(move |(i, kv)| (locale.as_str(), i, kv))
        })
        .collect();

    let pool = worker_pool(opts.num_threads)?;
    let counters = TaskCounters::new();
    let per_locale: Mutex<BTreeMap<&str, Vec<(usize, EntryBlock)>>> = Mutex::new(BTreeMap::new());

    pool.install(|| {
        tasks.par_iter().for_each(|&(locale, i, kv)| {
            if let Some(block) = run_pack_task(kv, locale, 0, &store, opts, &counters) {
                per_locale
                    .lock()
                    .unwrap()
                    .entry(locale)
                    .or_default()
                    .push((i, block));
            }
        });
    });
    store.finish()?;

    let mut packed = 0;
    for (locale, mut blocks) in per_locale.into_inner().unwrap() {
        blocks.sort_by_key(|(i, _)| *i);
        let entry_blocks: Vec<EntryBlock> = blocks.into_iter().map(|(_, b)| b).collect();
        packed += entry_blocks.len();

        let dir_name = VpkPair::new(locale, target, level, 0).dir_name;
        VpkDir::build_directory_file(&opts.build_path.join(dir_name), &entry_blocks)?;
    }

    let summary = summarize(&store, packed, &counters);
    info!(
        "Packed {} files across {} locales into {} ({} bytes total, {} bytes deduplicated in {} shared chunks)",
        summary.files_packed,
        locales.len(),
        pack_name,
        summary.pack_size,
        summary.shared_bytes,
        summary.shared_chunks
    );
    Ok(summary)
}

const SERVER_EXCLUDED_EXTENSIONS: [&str; 8] = [
    "raw", "vcs", "vtf", "vfont", "vbf", "bsp_lump", "vvd", "vtx",
];
const SERVER_EXCLUDED_DIRS: [&str; 4] = ["depot", "media", "shaders", "sound"];
const SERVER_EXCLUDED_MAP: &str = "mp_npe";
const COMMON_MAP: &str = "mp_common";

/// Routing predicate for the delta-common split: client-only asset types,
/// client-only top-level directories and the npe map never reach the
/// server stream.
pub fn routes_to_server(source_map: &str, entry_path: &str) -> bool {
    if source_map == SERVER_EXCLUDED_MAP {
        return false;
    }
    let (ext, dir, _) = crate::vpk::tree::split_entry_path(entry_path);
    if SERVER_EXCLUDED_EXTENSIONS.contains(&ext) {
        return false;
    }
    let top = dir.split('/').next().unwrap_or("");
    if SERVER_EXCLUDED_DIRS.contains(&top) {
        return false;
    }
    true
}

/// Map a file lands in: .bsp payloads are rehomed into the synthetic
/// common map regardless of where they came from.
fn effective_map(source_map: &str, entry_path: &str) -> String {
    if entry_path.ends_with(".bsp") {
        COMMON_MAP.to_string()
    } else {
        source_map.to_string()
    }
}

type GroupKey = (String, String, String); // (locale, stream, effective map)
type EnglishKey = (String, String, String); // (stream, effective map, entry path)

/// Batch packer: walks every per-map multi-locale manifest in the
/// workspace, routes each file into the shared client or server data file
/// and emits per-(locale, stream, map) directory files. English runs
/// first so later locales can fall back to its recorded descriptors when
/// their own source file is missing.
pub fn pack_delta_common(context: &str, opts: &PackOptions) -> Result<PackSummary> {
    let manifest_dir = opts.workspace.join("manifest");
    let mut maps: Vec<(String, BTreeMap<String, Vec<ManifestEntry>>)> = Vec::new();
    for dent in WalkDir::new(&manifest_dir).max_depth(1).into_iter().filter_map(|e| e.ok()) {
        let path = dent.path();
        if !path.is_file() || path.extension().map_or(true, |e| e != "vdf") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if !stem.starts_with("mp_") {
            continue;
        }
        maps.push((stem.to_string(), manifest::load_multi_manifest(path)?));
    }
    if maps.is_empty() {
        warn!("no per-map manifests found under {}", manifest_dir.display());
    }

    fs::create_dir_all(&opts.build_path)?;
    let client_store = ChunkStore::create(
        &opts.build_path.join(locale::delta_common_pack_name(context)),
    )?;
    let server_store = ChunkStore::create(
        &opts.build_path.join(locale::delta_common_pack_name("server")),
    )?;

    let pool = worker_pool(opts.num_threads)?;
    let counters = TaskCounters::new();
    let groups: Mutex<BTreeMap<GroupKey, Vec<EntryBlock>>> = Mutex::new(BTreeMap::new());
    let english_blocks: Mutex<HashMap<EnglishKey, EntryBlock>> = Mutex::new(HashMap::new());

    let run_locale = |locale: &str, map: &str, kv: &ManifestEntry| {
        let to_server = routes_to_server(map, &kv.entry_path);
        let stream = if to_server { "server" } else { context };
        let emap = effective_map(map, &kv.entry_path);
        let store = if to_server { &server_store } else { &client_store };

        let block = match resolve_source(&opts.workspace, locale, &kv.entry_path) {
            Some(source) => {
                match pack_entry_file(kv, &source, DELTA_COMMON_PACK_INDEX, store, opts.method) {
                    Ok(block) => Some(block),
                    Err(VpkError::EmptySource(path)) => {
                        warn!("{} is empty, skipping", path.display());
                        counters.skipped.fetch_add(1, Ordering::Relaxed);
                        None
                    }
                    Err(e) => {
                        error!("failed to pack {}: {e}", kv.entry_path);
                        counters.failures.fetch_add(1, Ordering::Relaxed);
                        None
                    }
                }
            }
            None => {
                // No locale or English source file; reuse what the English
                // pass recorded for the same slot.
                let recorded = english_blocks
                    .lock()
                    .unwrap()
                    .get(&(stream.to_string(), emap.clone(), kv.entry_path.clone()))
                    .cloned();
                if recorded.is_none() {
                    warn!("could not find source for {} ({locale})", kv.entry_path);
                    counters.skipped.fetch_add(1, Ordering::Relaxed);
                }
                recorded
            }
        };

        if let Some(block) = block {
            if locale == "english" {
                english_blocks.lock().unwrap().insert(
                    (stream.to_string(), emap.clone(), kv.entry_path.clone()),
                    block.clone(),
                );
            }
            groups
                .lock()
                .unwrap()
                .entry((locale.to_string(), stream.to_string(), emap))
                .or_default()
                .push(block);
        }
    };

    // English first: later locales depend on its recorded descriptors.
    pool.install(|| {
        maps.par_iter().for_each(|(map, locales)| {
            if let Some(entries) = locales.get("english") {
                entries.par_iter().for_each(|kv| run_locale("english", map, kv));
            }
        });
    });
    pool.install(|| {
        maps.par_iter().for_each(|(map, locales)| {
            locales
                .iter()
                .filter(|(locale, _)| locale.as_str() != "english")
                .collect::<Vec<_>>()
                .par_iter()
                .for_each(|(locale, entries)| {
                    entries.par_iter().for_each(|kv| run_locale(locale, map, kv));
                });
        });
    });
    client_store.finish()?;
    server_store.finish()?;

    let mut packed = 0;
    for ((locale, stream, emap), mut blocks) in groups.into_inner().unwrap() {
        blocks.sort_by(|a, b| a.entry_path.cmp(&b.entry_path));
        packed += blocks.len();

        let dir_name = format!("{locale}{stream}_{emap}.bsp.pak000_dir.vpk");
        VpkDir::build_directory_file(&opts.build_path.join(dir_name), &blocks)?;
    }

    let summary = PackSummary {
        files_packed: packed,
        files_skipped: counters.skipped.load(Ordering::Relaxed),
        failures: counters.failures.load(Ordering::Relaxed),
        pack_size: client_store.len() + server_store.len(),
        shared_bytes: client_store.shared_bytes() + server_store.shared_bytes(),
        shared_chunks: client_store.shared_chunks() + server_store.shared_chunks(),
    };
    info!(
        "Packed {} files into the delta-common streams ({} bytes total, {} bytes deduplicated in {} shared chunks)",
        summary.files_packed, summary.pack_size, summary.shared_bytes, summary.shared_chunks
    );
    Ok(summary)
}
