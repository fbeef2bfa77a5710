use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stream_ingest::{FileRegistry, StreamIngest};

#[derive(Parser, Debug)]
#[command(name = "stream-ingest", about = "Reconcile a sensor-stream CSV against the stream registry")]
struct Cli {
    /// Registry directory (one NDJSON file per site code).
    #[arg(long, global = true, env = "STREAM_INGEST_REGISTRY")]
    registry: Option<PathBuf>,

    /// Where correction files are written.
    #[arg(long, global = true, default_value = ".")]
    out_dir: PathBuf,

    #[arg(long, global = true)]
    no_progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Header, row and duplicate checks only.
    Verify { file: PathBuf },
    /// Show what `ingest` would do, without writing.
    Check { file: PathBuf },
    /// Reconcile and write creates/updates.
    Ingest {
        file: PathBuf,
        /// Stamped into created/updated audit fields.
        #[arg(long)]
        user: String,
        /// Overwrite every comparable field instead of only merging tags.
        #[arg(long)]
        update: bool,
    },
}

fn open_registry(cli: &Cli) -> Result<FileRegistry> {
    let dir = cli
        .registry
        .as_ref()
        .context("--registry (or STREAM_INGEST_REGISTRY) is required for this command")?;
    FileRegistry::open(dir).with_context(|| format!("open registry at {}", dir.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let base = StreamIngest::new().output_dir(&cli.out_dir).progress(!cli.no_progress);

    match &cli.command {
        Command::Verify { file } => {
            let s = base.verify(file)?;
            println!(
                "{} rows: {} valid, {} parse errors, {} duplicates, {} unknown process codes",
                s.rows, s.valid, s.parse_failed, s.duplicates, s.unknown_process
            );
        }
        Command::Check { file } => {
            let registry = open_registry(&cli)?;
            let s = base.check(file, &registry)?;
            let t = s.tally;
            println!(
                "create {}, update {}, unchanged {}, duplicate {}, ambiguous {}, lookup failed {}, parse failed {}",
                t.create, t.update, t.unchanged, t.duplicate, t.ambiguous, t.lookup_failed, t.parse_failed
            );
        }
        Command::Ingest { file, user, update } => {
            let registry = open_registry(&cli)?;
            let s = base.user(user).full_update(*update).ingest(file, &registry)?;
            println!(
                "created {}, updated {}, unchanged {}, unresolved {} ({} batch submissions)",
                s.created, s.updated, s.tally.unchanged, s.unresolved, s.submissions
            );
            if let Some(path) = &s.correction_file {
                println!("Correction file: {}", path.display());
            }
        }
    }
    Ok(())
}
