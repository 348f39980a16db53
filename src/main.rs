use anyhow::Context;
use clap::{Parser, Subcommand};
use panelcalc::cli::{self, CalculateArgs};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "panelcalc")]
#[command(about = "Row formulas over panel data, with offsets that never cross firms")]
#[command(long_about = "panelcalc - Row-oriented formulas for panel data

Formulas reference a column at a relative row: Revenue(x), Revenue(x-1),
Revenue(x+2). Rows are grouped by an id column, so Revenue(x-1) on a firm's
first row is blank instead of reading the previous firm's last row. Any
blank operand blanks the whole result.

COMMANDS:
  calculate   - Compute every formula of a job file
  validate    - Check job files without computing
  groups      - List the entity groups of a job's data
  columns     - List data columns and formulas of a job

EXAMPLES:
  panelcalc calculate job.yaml -o results.csv
  panelcalc calculate job.yaml --id-column Ticker --dry-run
  panelcalc validate jobs/*.yaml")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Calculate all formulas in a job file.

Formulas run in the order they are declared; later formulas may use earlier
results. The output holds the id and time columns plus every computed
variable. The output format follows the file extension (.csv, .yaml, .json,
.xlsx); without -o and without 'output:' in the job, a preview is printed.")]
    /// Calculate all formulas in a job file
    Calculate {
        /// Path to the job YAML file
        file: PathBuf,

        /// Output file (overrides 'output' in the job)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Load and check everything without computing or writing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show loading and per-formula progress
        #[arg(short, long)]
        verbose: bool,

        /// Id column to group by (overrides 'panel.id_column')
        #[arg(long, env = "PANELCALC_ID_COLUMN")]
        id_column: Option<String>,

        /// Evaluate groups one after another instead of in parallel
        #[arg(long)]
        sequential: bool,
    },

    /// Validate job files without calculating
    Validate {
        /// Path to job file(s) to validate
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List the entity groups of a job's data
    Groups {
        /// Path to the job YAML file
        file: PathBuf,

        /// Id column to group by (overrides 'panel.id_column')
        #[arg(long, env = "PANELCALC_ID_COLUMN")]
        id_column: Option<String>,
    },

    /// List data columns (with their sources) and formulas of a job
    Columns {
        /// Path to the job YAML file
        file: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "panelcalc=info" } else { "panelcalc=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Calculate { verbose: true, .. });
    init_tracing(verbose);

    match cli.command {
        Commands::Calculate {
            file,
            output,
            dry_run,
            verbose,
            id_column,
            sequential,
        } => {
            let context = format!("calculating {}", file.display());
            cli::calculate(CalculateArgs {
                file,
                output,
                dry_run,
                verbose,
                id_column,
                sequential,
            })
            .context(context)
        }

        Commands::Validate { files } => cli::validate(files).context("validation failed"),

        Commands::Groups { file, id_column } => {
            let context = format!("listing groups of {}", file.display());
            cli::groups(file, id_column).context(context)
        }

        Commands::Columns { file } => {
            let context = format!("listing columns of {}", file.display());
            cli::columns(file).context(context)
        }
    }
}
