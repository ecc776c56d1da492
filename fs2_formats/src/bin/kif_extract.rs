use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use fs2_formats::{AssetLocation, KifManifest, decrypt_entry, normalize_name};

#[derive(Parser, Debug)]
#[command(about = "Extract and decrypt assets listed in a kif.fs2 manifest", version)]
struct Args {
    /// Manifest produced by the archive dumper
    #[arg(long, value_name = "PATH")]
    manifest: PathBuf,

    /// Directory holding the `.int` archives (defaults to the manifest's directory)
    #[arg(long, value_name = "DIR")]
    archives: Option<PathBuf>,

    /// Destination directory to materialise assets
    #[arg(long, value_name = "DIR", default_value = "extracted")]
    dest: PathBuf,

    /// Individual asset names to extract (case-insensitive, may repeat)
    #[arg(long = "asset", value_name = "NAME")]
    assets: Vec<String>,

    /// Overwrite existing files instead of skipping them
    #[arg(long)]
    overwrite: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let manifest = KifManifest::open(&args.manifest)?;
    if manifest.is_empty() {
        bail!("manifest {} lists no assets", args.manifest.display());
    }

    let archive_root = args
        .archives
        .clone()
        .or_else(|| args.manifest.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    let filter: HashSet<String> = args
        .assets
        .iter()
        .map(|name| normalize_name(name.trim()))
        .collect();

    fs::create_dir_all(&args.dest)
        .with_context(|| format!("creating destination {}", args.dest.display()))?;

    let mut extracted = 0usize;
    for (name, location) in manifest.entries() {
        if !filter.is_empty() && !filter.contains(name) {
            continue;
        }

        let dest_path = args.dest.join(sanitize(name));
        if dest_path.exists() && !args.overwrite {
            continue;
        }

        let bytes = read_asset(&manifest, &archive_root, location)
            .with_context(|| format!("extracting {name}"))?;
        fs::write(&dest_path, bytes)
            .with_context(|| format!("writing {}", dest_path.display()))?;
        extracted += 1;
    }

    println!(
        "Extracted {} entries from {} into {}",
        extracted,
        args.manifest.display(),
        args.dest.display()
    );
    Ok(())
}

fn read_asset(manifest: &KifManifest, root: &Path, location: &AssetLocation) -> Result<Vec<u8>> {
    let archive = manifest
        .archive(location.archive)
        .with_context(|| format!("archive {} missing from manifest", location.archive))?;
    let path = root.join(&archive.filename);
    let mut file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
    file.seek(SeekFrom::Start(location.offset))
        .with_context(|| format!("seeking to 0x{:X} in {}", location.offset, path.display()))?;
    let mut buffer = vec![0u8; location.length as usize];
    file.read_exact(&mut buffer)
        .with_context(|| format!("reading {} bytes from {}", location.length, path.display()))?;
    if archive.encrypted {
        decrypt_entry(&archive.key, &mut buffer)?;
    }
    Ok(buffer)
}

fn sanitize(name: &str) -> PathBuf {
    let raw = PathBuf::from(name.replace('\\', "/"));
    let mut relative = PathBuf::new();
    for component in raw.components() {
        if let Component::Normal(part) = component {
            relative.push(part);
        }
    }
    relative
}
