use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "seqpool-cmd")]
#[command(about = "Drives an ordered worker pool and verifies its output order")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run units that sleep a random duration and return their own id
    Run {
        /// Number of worker threads (defaults to 1.5x the available parallelism)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Number of work units to submit
        #[arg(short, long, default_value_t = 100_000)]
        count: u64,

        /// Minimum per-unit delay in microseconds
        #[arg(long, default_value_t = 0)]
        min_delay_us: u64,

        /// Maximum per-unit delay in microseconds
        #[arg(long, default_value_t = 3_000)]
        max_delay_us: u64,

        /// Capacity of the intake queue and completion channels
        #[arg(long)]
        capacity: Option<usize>,
    },

    /// Run units whose delays make them complete in reverse submission order
    Reverse {
        /// Number of worker threads (defaults to one per unit, capped at 8x the default pool size)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Number of work units to submit
        #[arg(short, long, default_value_t = 64)]
        count: u64,

        /// Delay step in microseconds: unit `i` sleeps `(count - i) * step`
        #[arg(long, default_value_t = 1_000)]
        step_us: u64,
    },
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            workers,
            count,
            min_delay_us,
            max_delay_us,
            capacity,
        } => commands::run::run(workers, count, min_delay_us, max_delay_us, capacity),
        Commands::Reverse {
            workers,
            count,
            step_us,
        } => commands::reverse::run(workers, count, step_us),
    }
}
