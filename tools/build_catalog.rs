use std::env;
use std::path::PathBuf;

use catalog::{build_catalog, CatalogStore, ScanOptions};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut locations: Vec<String> = Vec::new();
    let mut store_path: Option<String> = None;
    let mut dump_json = false;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--store" => store_path = Some(args.next().ok_or("--store needs a path")?),
            "--json" => dump_json = true,
            _ => locations.push(arg),
        }
    }
    if locations.is_empty() {
        return Err("usage: build_catalog [--store <path>] [--json] <location>...".into());
    }
    let store_path = store_path
        .or_else(|| env::var("STORE_PATH").ok())
        .unwrap_or_else(|| "catalog.redb".to_string());

    let store = CatalogStore::open(&PathBuf::from(&store_path))?;
    let (catalog, stats) = build_catalog(&locations, &ScanOptions::default(), &store)?;
    let flat = catalog.flatten();
    store.save_snapshot(&flat)?;

    let totals = catalog.stats();
    println!(
        "Indexed: {} songs, {} albums, {} artists ({} files seen, {} skipped)",
        totals.songs, totals.albums, totals.artists, stats.scanned, stats.skipped
    );
    if dump_json {
        println!("{}", serde_json::to_string_pretty(&flat)?);
    }

    Ok(())
}
