use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use log::info;

use revpk::{
    list_entries, pack_delta_common, pack_store, pack_store_multi, unpack_store,
    unpack_store_multi, CompressionMethod, PackOptions, VpkDir,
};

fn print_usage() {
    println!("Usage:");
    println!();
    println!("  revpk pack <locale> <context> <levelName> [workspacePath] [buildPath] [numThreads] [compressLevel]");
    println!("  revpk unpack <vpkFile> [outPath] [sanitize]");
    println!("  revpk packmulti <context> <levelName> [workspacePath] [buildPath] [numThreads] [compressLevel]");
    println!("  revpk unpackmulti <anyDirFile> [outPath] [sanitize]");
    println!("  revpk packdeltacommon <context> [workspacePath] [buildPath] [numThreads] [compressLevel]");
    println!("  revpk ls <dirFile>");
    println!();
    println!("Examples:");
    println!("  revpk pack english client mp_rr_box");
    println!("  revpk unpack englishclient_mp_rr_box.bsp.pak000_dir.vpk ship/ 1");
}

fn wants_help(args: &[String]) -> bool {
    args.iter().any(|a| a == "--help")
}

fn pack_options(args: &[String], first_optional: usize) -> PackOptions {
    PackOptions {
        workspace: PathBuf::from(
            args.get(first_optional).map(String::as_str).unwrap_or("ship"),
        ),
        build_path: PathBuf::from(
            args.get(first_optional + 1).map(String::as_str).unwrap_or("vpk"),
        ),
        num_threads: args
            .get(first_optional + 2)
            .and_then(|s| s.parse().ok())
            .unwrap_or(-1),
        method: CompressionMethod::from_level_token(
            args.get(first_optional + 3).map(String::as_str).unwrap_or("uber"),
        ),
    }
}

fn parse_sanitize(arg: Option<&String>) -> bool {
    arg.map(|s| s.parse::<i32>().unwrap_or(0) != 0).unwrap_or(false)
}

fn run_pack(args: &[String]) -> Result<()> {
    if wants_help(args) {
        println!("Usage: revpk pack <locale> <context> <levelName> [workspacePath] [buildPath] [numThreads] [compressLevel]");
        println!();
        println!("Packs one locale's content tree into a data + directory VPK pair,");
        println!("driven by the manifest under <workspacePath>/manifest/.");
        println!();
        println!("Example:");
        println!("  revpk pack english client mp_rr_box ship vpk -1 uber");
        return Ok(());
    }
    if args.len() < 5 {
        bail!("Usage: revpk pack <locale> <context> <levelName> [workspacePath] [buildPath] [numThreads] [compressLevel]");
    }

    let opts = pack_options(args, 5);
    info!("PACK: {} {} {}", args[2], args[3], args[4]);

    let start = Instant::now();
    let summary = pack_store(&args[2], &args[3], &args[4], &opts)?;
    info!("Packing took {:.2} seconds", start.elapsed().as_secs_f64());

    if summary.failures > 0 {
        bail!("{} file(s) failed to pack", summary.failures);
    }
    Ok(())
}

fn run_unpack(args: &[String]) -> Result<()> {
    if wants_help(args) {
        println!("Usage: revpk unpack <vpkFile> [outPath] [sanitize]");
        println!();
        println!("Extracts every file referenced by a VPK directory file and rebuilds");
        println!("its manifest. sanitize=1 accepts a data-file path and substitutes");
        println!("the matching _dir file.");
        return Ok(());
    }
    if args.len() < 3 {
        bail!("Usage: revpk unpack <vpkFile> [outPath] [sanitize]");
    }

    let out_path = PathBuf::from(args.get(3).map(String::as_str).unwrap_or("ship"));
    let sanitize = parse_sanitize(args.get(4));

    let start = Instant::now();
    let dir = VpkDir::open_with_sanitize(Path::new(&args[2]), sanitize)?;
    info!("UNPACK: {}", args[2]);

    let summary = unpack_store(&dir, &out_path, -1)?;
    info!("Unpacking took {:.2} seconds", start.elapsed().as_secs_f64());

    if summary.failures > 0 {
        bail!("{} file(s) failed to unpack", summary.failures);
    }
    Ok(())
}

fn run_pack_multi(args: &[String]) -> Result<()> {
    if wants_help(args) {
        println!("Usage: revpk packmulti <context> <levelName> [workspacePath] [buildPath] [numThreads] [compressLevel]");
        println!();
        println!("Packs every locale from <workspacePath>/manifest/multiLangManifest.vdf");
        println!("into a single shared data file with one directory file per locale.");
        return Ok(());
    }
    if args.len() < 4 {
        bail!("Usage: revpk packmulti <context> <levelName> [workspacePath] [buildPath] [numThreads] [compressLevel]");
    }

    let opts = pack_options(args, 4);
    info!("PACKMULTI: {} {}", args[2], args[3]);

    let start = Instant::now();
    let summary = pack_store_multi(&args[2], &args[3], &opts)?;
    info!("Packing took {:.2} seconds", start.elapsed().as_secs_f64());

    if summary.failures > 0 {
        bail!("{} file(s) failed to pack", summary.failures);
    }
    Ok(())
}

fn run_unpack_multi(args: &[String]) -> Result<()> {
    if wants_help(args) {
        println!("Usage: revpk unpackmulti <anyDirFile> [outPath] [sanitize]");
        println!();
        println!("Given any one locale's directory file, discovers the sibling locale");
        println!("directories, unpacks the English fallback in full and every other");
        println!("locale as differences, then writes the multi-locale manifest.");
        return Ok(());
    }
    if args.len() < 3 {
        bail!("Usage: revpk unpackmulti <anyDirFile> [outPath] [sanitize]");
    }

    let out_path = PathBuf::from(args.get(3).map(String::as_str).unwrap_or("ship"));
    let sanitize = parse_sanitize(args.get(4));

    let start = Instant::now();
    info!("UNPACKMULTI: {}", args[2]);
    let summary = unpack_store_multi(Path::new(&args[2]), &out_path, sanitize, -1)?;
    info!("Unpacking took {:.2} seconds", start.elapsed().as_secs_f64());

    if summary.failures > 0 {
        bail!("{} file(s) failed to unpack", summary.failures);
    }
    Ok(())
}

fn run_pack_delta_common(args: &[String]) -> Result<()> {
    if wants_help(args) {
        println!("Usage: revpk packdeltacommon <context> [workspacePath] [buildPath] [numThreads] [compressLevel]");
        println!();
        println!("Batch-packs every per-map manifest under <workspacePath>/manifest/");
        println!("into the two shared delta-common data files, emitting one directory");
        println!("file per locale, stream and map.");
        return Ok(());
    }
    if args.len() < 3 {
        bail!("Usage: revpk packdeltacommon <context> [workspacePath] [buildPath] [numThreads] [compressLevel]");
    }

    let opts = pack_options(args, 3);
    info!("PACKDELTACOMMON: {}", args[2]);

    let start = Instant::now();
    let summary = pack_delta_common(&args[2], &opts)?;
    info!("Packing took {:.2} seconds", start.elapsed().as_secs_f64());

    if summary.failures > 0 {
        bail!("{} file(s) failed to pack", summary.failures);
    }
    Ok(())
}

fn run_ls(args: &[String]) -> Result<()> {
    if wants_help(args) {
        println!("Usage: revpk ls <dirFile>");
        println!();
        println!("Lists every entry in a VPK directory file with its reconstructed size.");
        return Ok(());
    }
    if args.len() < 3 {
        bail!("Usage: revpk ls <dirFile>");
    }

    let dir = VpkDir::open(Path::new(&args[2]))?;
    let mut total = 0u64;
    for (path, size) in list_entries(&dir) {
        println!("{size:>12}  {path}");
        total += size;
    }
    println!("{:>12}  total in {} entries", total, dir.entries.len());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "pack" => run_pack(&args),
        "unpack" => run_unpack(&args),
        "packmulti" => run_pack_multi(&args),
        "unpackmulti" => run_unpack_multi(&args),
        "packdeltacommon" => run_pack_delta_common(&args),
        "ls" => run_ls(&args),
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        other => {
            print_usage();
            Err(anyhow!("unknown command: {other}"))
        }
    }
}
