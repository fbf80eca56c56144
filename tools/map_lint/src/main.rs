//! Extraction map linting tool.

use anyhow::Result;
use bacex::bacnet::map;
use bacex::bacnet::ObjectType;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "map_lint")]
#[command(about = "Lint extraction map CSV files")]
struct Args {
    /// Path to the extraction map CSV file.
    #[arg(short, long)]
    map: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let entries = map::read_map_file(&args.map)?;
    if entries.is_empty() {
        anyhow::bail!("no usable rows in {:?}", args.map);
    }

    let unknown_types: Vec<&str> = entries
        .iter()
        .filter(|e| ObjectType::parse(&e.obj_type).is_none())
        .map(|e| e.obj_type.as_str())
        .collect();
    let unresolvable = entries
        .iter()
        .filter(|e| e.device_id.is_none() && e.address.is_none())
        .count();

    println!("Map validated: {:?}", args.map);
    println!("  points: {}", entries.len());
    if !unknown_types.is_empty() {
        println!("  warning: unknown object types: {unknown_types:?}");
    }
    if unresolvable > 0 {
        println!("  warning: {unresolvable} row(s) have neither device_id nor address");
    }
    Ok(())
}
