// ========================================================================================
//
//                      THE COMMAND-LINE ORCHESTRATOR: DPERS
//
// ========================================================================================
//
// Reads a delimited table whose missing cells are marked, estimates its covariance
// matrix with the pairwise maximum-likelihood procedure, and writes the labelled
// matrix as TSV to a file or to stdout.
//
// Options resolve in three layers: built-in defaults, then an optional TOML file,
// then explicit command-line flags.

use clap::Parser;
use dpers::data::{load_table, write_covariance};
use dpers::{ConsoleFitProgress, FitOptions, NoopFitProgress, VarianceConvention};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

// ========================================================================================
//                         COMMAND-LINE INTERFACE DEFINITION
// ========================================================================================

#[derive(Parser, Debug)]
#[clap(
    name = "dpers",
    version,
    about = "Covariance estimation for tables with randomly missing entries."
)]
struct Args {
    /// Path to the input table (header row required; `.gz` accepted; `-` for stdin).
    input_path: PathBuf,

    /// Where to write the covariance matrix. Defaults to stdout.
    #[clap(long, short)]
    output: Option<PathBuf>,

    /// TOML file with `variance`, `center` and `parallel` settings.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Field delimiter of the input table.
    #[clap(long, default_value_t = '\t')]
    delimiter: char,

    /// Subtract each column's observed mean before estimating.
    #[clap(long)]
    center: bool,

    /// Use the n-1 denominator for the marginal variances.
    #[clap(long)]
    unbiased: bool,

    /// Solve feature pairs on a single thread.
    #[clap(long)]
    sequential: bool,

    /// Size of the worker pool used for pairwise solving.
    #[clap(long)]
    threads: Option<usize>,

    /// Do not draw a progress bar.
    #[clap(long)]
    no_progress: bool,
}

impl Args {
    fn resolve_options(&self) -> Result<FitOptions, String> {
        let mut options = match &self.config {
            Some(path) => FitOptions::from_toml_path(path).map_err(|e| e.to_string())?,
            None => FitOptions::default(),
        };
        if self.center {
            options.center = true;
        }
        if self.unbiased {
            options.variance = VarianceConvention::Unbiased;
        }
        if self.sequential {
            options.parallel = false;
        }
        Ok(options)
    }

    fn delimiter_byte(&self) -> Result<u8, String> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                format!(
                    "delimiter '{}' must be a single ASCII character",
                    self.delimiter
                )
            })
    }

    /// Log level used when `RUST_LOG` is unset. Info lines would tear through a live
    /// progress bar on stderr, so only warnings are shown while one is drawn.
    fn default_log_filter(&self) -> &'static str {
        if self.no_progress { "info" } else { "warn" }
    }
}

// ========================================================================================
//                           THE MAIN ORCHESTRATION LOGIC
// ========================================================================================

fn main() {
    let start_time = Instant::now();
    let args = Args::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.default_log_filter()),
    )
    .init();

    if let Err(e) = run(&args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    eprintln!("> Finished in {:.2?}", start_time.elapsed());
}

fn run(args: &Args) -> Result<(), String> {
    let options = args.resolve_options()?;
    let delimiter = args.delimiter_byte()?;

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| format!("failed to configure {threads} worker threads: {e}"))?;
    }

    eprintln!("> Reading {}", args.input_path.display());
    let table = load_table(&args.input_path, delimiter).map_err(|e| e.to_string())?;

    let covariance = if args.no_progress {
        dpers::fit_with_progress(table.values.view(), &options, &NoopFitProgress)
    } else {
        dpers::fit_with_progress(table.values.view(), &options, &ConsoleFitProgress::new())
    }
    .map_err(|e| e.to_string())?;

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| format!("cannot create '{}': {e}", path.display()))?;
            write_covariance(file, &table.columns, covariance.view())
                .map_err(|e| e.to_string())?;
            eprintln!("> Covariance matrix written to {}", path.display());
        }
        None => {
            write_covariance(io::stdout().lock(), &table.columns, covariance.view())
                .map_err(|e| e.to_string())?;
        }
    }

    Ok(())
}
