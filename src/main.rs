//! Rewind CLI

use std::path::{Path, PathBuf};
use std::process;

use rewind::storage::{CassetteReader, CASSETTE_EXTENSION};
use rewind::{Config, Result};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Rewind v{}", rewind::version());
        eprintln!();
        eprintln!("Usage: rewind <command> [options]");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  inspect   List the interactions in a cassette file");
        eprintln!("  stats     Count cassettes and interactions in a library");
        eprintln!();
        eprintln!("Set RUST_LOG=debug for detailed logs.");
        process::exit(1);
    }

    let command = &args[1];

    let result = match command.as_str() {
        "inspect" => {
            if args.len() < 3 {
                eprintln!("Usage: rewind inspect <cassette-file>");
                process::exit(1);
            }
            inspect(&PathBuf::from(&args[2]))
        }
        "stats" => {
            if args.len() < 3 {
                eprintln!("Usage: rewind stats <config.toml>");
                process::exit(1);
            }
            show_stats(&PathBuf::from(&args[2]))
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'rewind' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn inspect(path: &Path) -> Result<()> {
    if !path.is_file() {
        eprintln!("Cassette not found: {}", path.display());
        process::exit(1);
    }

    let display_name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    let interactions = CassetteReader::new(path, display_name).load(None)?;

    println!("Cassette: {}", path.display());
    println!("Interactions: {}", interactions.len());
    println!();

    for (i, interaction) in interactions.iter().enumerate() {
        println!(
            "{:>4}  {} {} -> {} {}",
            i + 1,
            interaction.request.method,
            interaction.request.uri,
            interaction.response.status.code,
            interaction.response.status.message
        );
    }

    Ok(())
}

fn show_stats(config_path: &Path) -> Result<()> {
    let config = Config::from_file(config_path)?;

    let Some(dir) = config.cassette_library_dir else {
        println!("No cassette_library_dir configured; cassettes are kept in memory.");
        return Ok(());
    };

    if !dir.exists() {
        eprintln!("Directory not found: {}", dir.display());
        process::exit(1);
    }

    let mut files = Vec::new();
    collect_cassettes(&dir, &mut files)?;
    files.sort();

    let mut total = 0;
    let mut unreadable = 0;

    println!("Cassette library: {}", dir.display());
    println!();

    for file in &files {
        let name = file.strip_prefix(&dir).unwrap_or(file).display().to_string();
        match CassetteReader::new(file, name.clone()).load(None) {
            Ok(interactions) => {
                total += interactions.len();
                println!("{:>6}  {name}", interactions.len());
            }
            Err(e) => {
                unreadable += 1;
                println!("     ?  {name} ({e})");
            }
        }
    }

    println!();
    println!("Cassettes: {}", files.len());
    println!("Interactions: {total}");
    if unreadable > 0 {
        println!("Unreadable: {unreadable}");
    }

    Ok(())
}

fn collect_cassettes(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_cassettes(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == CASSETTE_EXTENSION) {
            files.push(path);
        }
    }
    Ok(())
}
