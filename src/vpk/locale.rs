//! Locale handling and pack/directory file naming.

use std::path::{Path, PathBuf};

use crate::vpk::entry::DELTA_COMMON_PACK_INDEX;

/// Closed set of shipped locales. Order is significant: prefix stripping
/// takes the first match.
pub const KNOWN_LOCALES: [&str; 11] = [
    "english",
    "french",
    "german",
    "italian",
    "spanish",
    "russian",
    "polish",
    "japanese",
    "korean",
    "tchinese",
    "portuguese",
];

const DIR_SUFFIX: &str = ".bsp.pak000_dir";

/// Pack + directory file names for one `(locale, target, level, patch)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpkPair {
    pub pack_name: String,
    pub dir_name: String,
}

impl VpkPair {
    pub fn new(locale: &str, target: &str, level: &str, patch: u16) -> Self {
        let locale = if locale.is_empty() { "english" } else { locale };
        let target = if target.is_empty() { "server" } else { target };
        let level = if level.is_empty() { "map_unknown" } else { level };

        Self {
            pack_name: format!("{target}_{level}.bsp.pak000_{patch:03}.vpk"),
            dir_name: format!("{locale}{target}_{level}.bsp.pak000_dir.vpk"),
        }
    }
}

/// Removes the leading known-locale prefix from a directory file name,
/// e.g. "englishserver_mp_rr_box.bsp.pak000_dir.vpk" -> "server_mp_rr_box...".
pub fn strip_locale_prefix(file_name: &str) -> &str {
    for locale in KNOWN_LOCALES {
        if let Some(rest) = file_name.strip_prefix(locale) {
            return rest;
        }
    }
    file_name
}

/// The known locale a directory file name starts with, if any.
pub fn locale_of_dir_name(file_name: &str) -> Option<&'static str> {
    KNOWN_LOCALES
        .into_iter()
        .find(|locale| file_name.starts_with(locale))
}

/// Base name used for manifest files: everything before ".bsp.pak000_dir",
/// e.g. "englishclient_mp_rr_box.bsp.pak000_dir.vpk" -> "englishclient_mp_rr_box".
pub fn dir_base_name(dir_file_name: &str) -> &str {
    match dir_file_name.find(DIR_SUFFIX) {
        Some(pos) => &dir_file_name[..pos],
        None => dir_file_name,
    }
}

/// Name of the shared delta-common data file for one target stream.
pub fn delta_common_pack_name(target: &str) -> String {
    format!("{target}_mp_delta_common.bsp.pak000_000.vpk")
}

/// Resolves the data file name referenced by a pack index, given the
/// directory file's name. The reserved index maps to the shared
/// delta-common file; any other index substitutes "pak000_NNN".
pub fn pack_file_name_for_index(dir_file_name: &str, pack_index: u16) -> String {
    let stripped = strip_locale_prefix(dir_file_name);
    if pack_index == DELTA_COMMON_PACK_INDEX {
        let target = stripped.split('_').next().unwrap_or(stripped);
        return delta_common_pack_name(target);
    }
    stripped.replace("pak000_dir", &format!("pak000_{pack_index:03}"))
}

/// `sanitize` support: if the path names a data file ("pak000_NNN"),
/// substitute the corresponding directory file. Paths already pointing at a
/// "_dir" file are returned unchanged.
pub fn sanitize_dir_path(path: &Path) -> PathBuf {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return path.to_path_buf();
    };
    if name.contains("pak000_dir") {
        return path.to_path_buf();
    }
    if let Some(pos) = name.find("pak000_") {
        let digits = &name[pos + 7..];
        if digits.len() >= 3 && digits[..3].bytes().all(|b| b.is_ascii_digit()) {
            let fixed = format!("{}pak000_dir{}", &name[..pos], &digits[3..]);
            return path.with_file_name(fixed);
        }
    }
    path.to_path_buf()
}
