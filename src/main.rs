//! Strata CLI - Command-line tool for inspecting layered game content files.
//!
//! This is the main entry point for the Strata command-line application.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use strata::prelude::*;

/// Strata - layered game content file inspector
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that opens a content stack.
#[derive(Args)]
struct StackArgs {
    /// TOML file with `base`, `plugins`, `encoding` and `max_open_readers`
    #[arg(short, long, env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    /// Base master file
    #[arg(short, long, env = "STRATA_BASE")]
    base: Option<PathBuf>,

    /// Override files, in load order
    #[arg(short, long = "plugin")]
    plugins: Vec<PathBuf>,

    /// Text encoding of the content files (utf8, win1252, win1251)
    #[arg(short, long, value_parser = parse_encoding)]
    encoding: Option<Encoding>,

    /// Maximum number of content files kept open
    #[arg(long)]
    max_open: Option<usize>,

    /// Print diagnostics collected while loading
    #[arg(long)]
    diagnostics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the header of a content file or save
    Inspect {
        /// Content file or save
        file: PathBuf,
    },

    /// List every cell in a content stack
    Cells {
        #[command(flatten)]
        stack: StackArgs,
    },

    /// Load one cell and list its references
    Cell {
        #[command(flatten)]
        stack: StackArgs,

        /// Cell id: a name, `x,y` for an exterior, or `#FORMID`
        id: String,

        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Apply a save to a content stack and report what survived
    Restore {
        #[command(flatten)]
        stack: StackArgs,

        /// Save file
        save: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Inspect { file } => {
            cmd_inspect(&file)?;
        }
        Commands::Cells { stack } => {
            cmd_cells(&stack)?;
        }
        Commands::Cell { stack, id, json } => {
            cmd_cell(&stack, &id, json)?;
        }
        Commands::Restore { stack, save } => {
            cmd_restore(&stack, &save)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_encoding(name: &str) -> std::result::Result<Encoding, String> {
    Encoding::from_name(name).ok_or_else(|| format!("unknown encoding '{name}'"))
}

fn load_config(args: &StackArgs) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            toml::from_str::<SessionConfig>(&text).context("Failed to parse config")?
        }
        None => SessionConfig::default(),
    };

    if let Some(base) = &args.base {
        config.base = base.clone();
    }
    config.plugins.extend(args.plugins.iter().cloned());
    if let Some(encoding) = args.encoding {
        config.encoding = encoding;
    }
    if let Some(max) = args.max_open {
        config.max_open_readers = max;
    }
    if config.base.as_os_str().is_empty() {
        anyhow::bail!("No base file given (use --base, STRATA_BASE or a config file)");
    }
    Ok(config)
}

fn open_session(args: &StackArgs) -> Result<Session> {
    let config = load_config(args)?;
    let start = Instant::now();
    let session = Session::open(config).context("Failed to open content stack")?;
    println!(
        "Loaded {} files, {} cells, {} base records in {:?}",
        session.stack().len(),
        session.index().cell_count(),
        session.bases().len(),
        start.elapsed()
    );
    Ok(session)
}

fn print_diagnostics(session: &mut Session, enabled: bool) {
    let diagnostics = session.take_diagnostics();
    if diagnostics.is_empty() {
        return;
    }
    if enabled {
        for diagnostic in &diagnostics {
            println!("  ! {diagnostic}");
        }
    }
    println!("{} diagnostics", diagnostics.len());
}

fn print_header(header: &FileHeader) {
    println!("Dialect:     {:?}", header.dialect);
    println!("Version:     {:.2}", header.version);
    println!("Kind:        {:?}", header.kind);
    if !header.author.is_empty() {
        println!("Author:      {}", header.author);
    }
    if !header.description.is_empty() {
        println!("Description: {}", header.description);
    }
    println!("Records:     {}", header.record_count);
    for (i, master) in header.masters.iter().enumerate() {
        println!("Master {:>3}:  {} ({} bytes)", i, master.name, master.size);
    }
}

fn cmd_inspect(file: &Path) -> Result<()> {
    let reader = EsmReader::open(file, 0, Transcoder::default())
        .with_context(|| format!("Failed to open {}", file.display()))?;
    println!("{}", file.display());
    print_header(reader.header());
    Ok(())
}

fn cmd_cells(args: &StackArgs) -> Result<()> {
    let mut session = open_session(args)?;

    let mut count = 0;
    for id in session.cell_ids() {
        if let Some(entry) = session.index().cell(id) {
            let files: Vec<String> = entry.files().map(|f| f.to_string()).collect();
            println!(
                "{:<40} files [{}]{}",
                id.to_string(),
                files.join(","),
                if entry.deleted { " (deleted)" } else { "" }
            );
        }
        count += 1;
    }
    println!("\nTotal: {} cells", count);

    print_diagnostics(&mut session, args.diagnostics);
    Ok(())
}

fn cmd_cell(args: &StackArgs, id: &str, json: bool) -> Result<()> {
    let mut session = open_session(args)?;
    let id: CellId = id.parse().context("Invalid cell id")?;

    let start = Instant::now();
    let store = session
        .load(&id)
        .context("Failed to load cell")?
        .with_context(|| format!("Unknown cell {id}"))?;

    if json {
        let refs: Vec<serde_json::Value> = store
            .iter()
            .map(|live| {
                serde_json::json!({
                    "id": live.ref_num.to_string(),
                    "handle": live.handle.get(),
                    "base": live.base.id.to_string(),
                    "category": live.base.category,
                    "model": live.base.model,
                    "source": live.source,
                    "position": live.state.position,
                    "scale": live.state.scale,
                    "count": live.state.count,
                })
            })
            .collect();
        let output = serde_json::json!({ "cell": id, "references": refs });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Loaded cell {} in {:?}", id, start.elapsed());
        for category in Category::ALL {
            let list = store.refs(category);
            if list.is_empty() {
                continue;
            }
            println!("\n{} ({})", category, list.len());
            for live in list.iter() {
                let [x, y, z] = live.state.position.pos;
                println!(
                    "  {} {:<32} file {:>3}  ({:.1}, {:.1}, {:.1})",
                    live.ref_num,
                    live.base.id.to_string(),
                    live.source.map_or_else(|| "-".to_string(), |s| s.to_string()),
                    x,
                    y,
                    z
                );
            }
        }
    }

    print_diagnostics(&mut session, args.diagnostics);
    Ok(())
}

fn cmd_restore(args: &StackArgs, save: &Path) -> Result<()> {
    let mut session = open_session(args)?;

    let header = Session::read_save_header(save).context("Failed to read save header")?;
    let remap = IndexRemap::by_name(&header.masters, session.stack());
    for (i, master) in header.masters.iter().enumerate() {
        match remap.get(i as u8) {
            Some(current) => println!("  {} -> {}", master.name, current),
            None => println!("  {} -> (not loaded)", master.name),
        }
    }

    let summary = session
        .restore(save, &remap)
        .context("Failed to restore save")?;
    println!(
        "Restored {} references in {} cells ({} dropped)",
        summary.restored, summary.cells, summary.dropped
    );

    print_diagnostics(&mut session, args.diagnostics);
    Ok(())
}
