//! Build-manifest reading and writing.
//!
//! Manifests are Valve KeyValues text. The single-locale form maps entry
//! paths to per-file pack settings; the multi-locale form adds a locale
//! level on top and is completed so every locale carries the English view
//! of files it does not override.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use keyvalues_parser::{Obj, Value, Vdf};

use crate::vpk::entry::EntryBlock;
use crate::vpk::error::{Result, VpkError};
use crate::vpk::VpkDir;

pub const LOAD_FLAGS_DEFAULT: u32 = 3; // VISIBLE | CACHE
pub const TEXTURE_FLAGS_DEFAULT: u16 = 0;

pub const MULTI_MANIFEST_FILE: &str = "multiLangManifest.vdf";

/// Pack settings for one file, as read from a build manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub entry_path: String,
    pub preload_size: u16,
    pub load_flags: u32,
    pub texture_flags: u16,
    pub use_compression: bool,
    pub deduplicate: bool,
}

impl ManifestEntry {
    pub fn new(entry_path: impl Into<String>) -> Self {
        Self {
            entry_path: entry_path.into(),
            preload_size: 0,
            load_flags: LOAD_FLAGS_DEFAULT,
            texture_flags: TEXTURE_FLAGS_DEFAULT,
            use_compression: true,
            deduplicate: true,
        }
    }
}

fn attr<'a>(fields: &'a Obj, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(|values| values.first())
        .and_then(|value| match value {
            Value::Str(s) => Some(s.as_ref()),
            Value::Obj(_) => None,
        })
}

fn entry_from_fields(entry_path: &str, fields: &Obj) -> ManifestEntry {
    ManifestEntry {
        entry_path: entry_path.to_string(),
        preload_size: attr(fields, "preloadSize")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        load_flags: attr(fields, "loadFlags")
            .and_then(|s| s.parse().ok())
            .unwrap_or(LOAD_FLAGS_DEFAULT),
        texture_flags: attr(fields, "textureFlags")
            .and_then(|s| s.parse().ok())
            .unwrap_or(TEXTURE_FLAGS_DEFAULT),
        use_compression: attr(fields, "useCompression").map_or(true, |s| s != "0"),
        deduplicate: attr(fields, "deDuplicate").map_or(true, |s| s != "0"),
    }
}

fn entries_from_obj(obj: &Obj) -> Vec<ManifestEntry> {
    let mut entries = Vec::new();
    for (entry_path, values) in obj.iter() {
        for value in values {
            if let Value::Obj(fields) = value {
                entries.push(entry_from_fields(entry_path.as_ref(), fields));
            }
        }
    }
    entries
}

/// Parses a single-locale "BuildManifest" document.
pub fn parse_manifest(text: &str) -> Result<Vec<ManifestEntry>> {
    let vdf = Vdf::parse(text).map_err(|e| VpkError::ManifestParse(e.to_string()))?;
    match &vdf.value {
        Value::Obj(root) => Ok(entries_from_obj(root)),
        Value::Str(_) => Err(VpkError::ManifestParse(
            "expected a keyed manifest body".to_string(),
        )),
    }
}

pub fn load_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let text = fs::read_to_string(path)?;
    parse_manifest(&text)
}

/// Parses a multi-locale manifest (locale -> entry path -> settings) and
/// completes each non-English locale with the English records it lacks.
pub fn parse_multi_manifest(text: &str) -> Result<BTreeMap<String, Vec<ManifestEntry>>> {
    let vdf = Vdf::parse(text).map_err(|e| VpkError::ManifestParse(e.to_string()))?;
    let root = match &vdf.value {
        Value::Obj(root) => root,
        Value::Str(_) => {
            return Err(VpkError::ManifestParse(
                "expected a keyed manifest body".to_string(),
            ))
        }
    };

    let mut locales = BTreeMap::new();
    for (locale, values) in root.iter() {
        for value in values {
            if let Value::Obj(files) = value {
                locales.insert(locale.to_string(), entries_from_obj(files));
            }
        }
    }

    complete_with_english(&mut locales);
    Ok(locales)
}

pub fn load_multi_manifest(path: &Path) -> Result<BTreeMap<String, Vec<ManifestEntry>>> {
    let text = fs::read_to_string(path)?;
    parse_multi_manifest(&text)
}

/// Every locale gets a complete view: files only present in English are
/// copied into the other locales' lists.
fn complete_with_english(locales: &mut BTreeMap<String, Vec<ManifestEntry>>) {
    let Some(english) = locales.get("english").cloned() else {
        return;
    };
    for (locale, entries) in locales.iter_mut() {
        if locale == "english" {
            continue;
        }
        let missing: Vec<ManifestEntry> = english
            .iter()
            .filter(|e| !entries.iter().any(|x| x.entry_path == e.entry_path))
            .cloned()
            .collect();
        entries.extend(missing);
        entries.sort_by(|a, b| a.entry_path.cmp(&b.entry_path));
    }
}

fn push_entry(out: &mut String, entry: &ManifestEntry, depth: usize) {
    let tab = "\t".repeat(depth);
    let _ = writeln!(out, "{tab}\"{}\"", entry.entry_path);
    let _ = writeln!(out, "{tab}{{");
    let _ = writeln!(out, "{tab}\t\"preloadSize\"\t\"{}\"", entry.preload_size);
    let _ = writeln!(out, "{tab}\t\"loadFlags\"\t\"{}\"", entry.load_flags);
    let _ = writeln!(out, "{tab}\t\"textureFlags\"\t\"{}\"", entry.texture_flags);
    let _ = writeln!(
        out,
        "{tab}\t\"useCompression\"\t\"{}\"",
        entry.use_compression as u8
    );
    let _ = writeln!(out, "{tab}\t\"deDuplicate\"\t\"{}\"", entry.deduplicate as u8);
    let _ = writeln!(out, "{tab}}}");
}

pub fn write_manifest(path: &Path, entries: &[ManifestEntry]) -> Result<()> {
    let mut out = String::new();
    out.push_str("\"BuildManifest\"\n{\n");
    for entry in entries {
        push_entry(&mut out, entry, 1);
    }
    out.push_str("}\n");
    fs::write(path, out)?;
    Ok(())
}

pub fn write_multi_manifest(
    path: &Path,
    locales: &BTreeMap<String, Vec<ManifestEntry>>,
) -> Result<()> {
    let mut out = String::new();
    out.push_str("\"BuildManifest\"\n{\n");
    for (locale, entries) in locales {
        let _ = writeln!(out, "\t\"{locale}\"");
        out.push_str("\t{\n");
        for entry in entries {
            push_entry(&mut out, entry, 2);
        }
        out.push_str("\t}\n");
    }
    out.push_str("}\n");
    fs::write(path, out)?;
    Ok(())
}

fn entry_from_block(block: &EntryBlock) -> ManifestEntry {
    let compressed = block
        .fragments
        .iter()
        .any(|f| f.compressed_size < f.uncompressed_size);
    ManifestEntry {
        entry_path: block.entry_path.clone(),
        preload_size: block.preload_size(),
        load_flags: block
            .fragments
            .first()
            .map_or(LOAD_FLAGS_DEFAULT, |f| f.load_flags),
        texture_flags: block
            .fragments
            .first()
            .map_or(TEXTURE_FLAGS_DEFAULT, |f| f.texture_flags),
        use_compression: compressed,
        deduplicate: true,
    }
}

/// Rebuilds the manifest records described by an existing directory.
pub fn manifest_from_dir(dir: &VpkDir) -> Vec<ManifestEntry> {
    dir.entries.iter().map(entry_from_block).collect()
}

/// Projects a set of per-locale directories into the multi-locale manifest:
/// the union of all entry paths, each locale using its own record where
/// present and the English one otherwise.
pub fn build_multi_lang_manifest(
    language_dirs: &BTreeMap<String, VpkDir>,
    out_path: &Path,
) -> Result<()> {
    let mut all_paths = BTreeSet::new();
    for dir in language_dirs.values() {
        for block in &dir.entries {
            all_paths.insert(block.entry_path.as_str());
        }
    }

    let english_blocks: HashMap<&str, &EntryBlock> = language_dirs
        .get("english")
        .map(|dir| {
            dir.entries
                .iter()
                .map(|b| (b.entry_path.as_str(), b))
                .collect()
        })
        .unwrap_or_default();

    let mut locales = BTreeMap::new();
    for (locale, dir) in language_dirs {
        let own: HashMap<&str, &EntryBlock> = dir
            .entries
            .iter()
            .map(|b| (b.entry_path.as_str(), b))
            .collect();

        let mut entries = Vec::new();
        for path in &all_paths {
            if let Some(block) = own.get(path).or_else(|| english_blocks.get(path)) {
                entries.push(entry_from_block(block));
            }
        }
        locales.insert(locale.clone(), entries);
    }

    write_multi_manifest(out_path, &locales)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fields_and_defaults() {
        let text = r#"
"BuildManifest"
{
	"scripts/a.txt"
	{
		"preloadSize" "12"
		"loadFlags" "259"
		"textureFlags" "8"
		"useCompression" "0"
		"deDuplicate" "1"
	}
	"scripts/b.txt"
	{
	}
}
"#;
        let entries = parse_manifest(text).unwrap();
        assert_eq!(entries.len(), 2);

        let a = entries.iter().find(|e| e.entry_path == "scripts/a.txt").unwrap();
        assert_eq!(a.preload_size, 12);
        assert_eq!(a.load_flags, 259);
        assert_eq!(a.texture_flags, 8);
        assert!(!a.use_compression);
        assert!(a.deduplicate);

        let b = entries.iter().find(|e| e.entry_path == "scripts/b.txt").unwrap();
        assert_eq!(b.load_flags, LOAD_FLAGS_DEFAULT);
        assert!(b.use_compression);
    }

    #[test]
    fn multi_manifest_completes_locales_from_english() {
        let text = r#"
"BuildManifest"
{
	"english"
	{
		"a.txt" { "useCompression" "0" }
		"b.txt" { "useCompression" "0" }
	}
	"spanish"
	{
		"a.txt" { "useCompression" "0" }
	}
}
"#;
        let locales = parse_multi_manifest(text).unwrap();
        assert_eq!(locales["english"].len(), 2);
        let spanish = &locales["spanish"];
        assert_eq!(spanish.len(), 2);
        assert!(spanish.iter().any(|e| e.entry_path == "b.txt"));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            parse_manifest("not a manifest {"),
            Err(VpkError::ManifestParse(_))
        ));
    }
}
