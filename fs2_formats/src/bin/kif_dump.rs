use std::env;

use anyhow::{Context, Result};
use fs2_formats::KifManifest;

fn main() -> Result<()> {
    let path = env::args().nth(1).context("usage: kif_dump <kif.fs2 manifest>")?;
    let manifest = KifManifest::open(&path)?;
    println!(
        "{} archives, {} assets in {}",
        manifest.archives().len(),
        manifest.len(),
        path
    );
    for (index, archive) in manifest.archives().iter().enumerate() {
        let key = if archive.encrypted {
            format!(
                "{:02x}{:02x}{:02x}{:02x}",
                archive.key[0], archive.key[1], archive.key[2], archive.key[3]
            )
        } else {
            String::from("--------")
        };
        println!(
            "  [{index:>2}] {name:<24} {count:>6} entries  key {key}",
            name = archive.filename,
            count = archive.entry_count,
        );
    }
    for (name, location) in manifest.entries() {
        println!(
            "{name:<40} {archive:>3} {offset:>10} {length:>10}",
            archive = location.archive,
            offset = location.offset,
            length = location.length
        );
    }
    Ok(())
}
