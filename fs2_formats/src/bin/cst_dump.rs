use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use fs2_formats::{CatScene, RecordKind};
use serde::Serialize;

/// Inspect a compiled CatScene script and list its records in table order.
#[derive(Parser)]
struct Args {
    /// Path to the `.cst` scene to inspect
    path: PathBuf,

    /// Emit the records as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Hide source-file and line marker records
    #[arg(long)]
    skip_markers: bool,
}

#[derive(Serialize)]
struct RecordRow {
    index: usize,
    flag: u8,
    kind: RecordKind,
    text: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let bytes = fs::read(&args.path)
        .with_context(|| format!("reading {}", args.path.display()))?;
    let scene = CatScene::parse(&bytes)
        .with_context(|| format!("parsing {}", args.path.display()))?;

    let rows: Vec<RecordRow> = scene
        .records()
        .enumerate()
        .filter(|(_, record)| {
            !(args.skip_markers
                && matches!(record.kind, RecordKind::SourceFile | RecordKind::LineMarker))
        })
        .map(|(index, record)| RecordRow {
            index,
            flag: record.flag,
            kind: record.kind,
            text: record.text().into_owned(),
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!(
        "scene {} ({} records, compressed {} / decompressed {})",
        args.path.display(),
        scene.len(),
        scene.compressed_size,
        scene.decompressed_size
    );
    for row in &rows {
        println!(
            "{:>6}  {:<12} {}",
            row.index,
            format!("{:?}", row.kind),
            row.text
        );
    }
    Ok(())
}
