//! pierfit: generate parametric T-pillar models and fit them to scans.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output, or pass
//! `-v` (info), `-vv` (debug) or `-vvv` (trace):
//! - `RUST_LOG=pierfit_algorithms=debug` - per-iteration GICP statistics
//! - `RUST_LOG=pierfit_fitting=info` - pipeline stage summaries
//!
//! # Example
//!
//! ```bash
//! pierfit generate --params 2,3,0.5,1,1,0.3 -o pillar.ply
//! pierfit -v fit --params 2,3,0.5,1,1,0.3 --scan scan.ply -o fitted.ply
//! pierfit align --mesh pillar.ply --scan scan.ply -o aligned.ply --refine
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

/// pierfit - fit parametric pier models to point cloud scans
#[derive(Parser)]
#[command(name = "pierfit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

/// GICP settings shared by `fit` and `align`
#[derive(clap::Args, Clone, Copy)]
pub struct RegistrationArgs {
    /// Points sampled from the model surface for fine alignment
    #[arg(long, default_value = "10000")]
    samples: usize,

    /// Seed for surface sampling
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Maximum correspondence distance for GICP
    #[arg(long, default_value = "0.05")]
    threshold: f32,

    /// Maximum GICP iterations
    #[arg(long, default_value = "200")]
    max_iterations: usize,

    /// Fail when GICP exhausts its iterations without converging
    #[arg(long)]
    require_convergence: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a T-pillar mesh from its six distance parameters
    Generate {
        /// p1..p6: outer width, total height, cap height, base height, stem width, depth
        #[arg(long, value_delimiter = ',', required = true)]
        params: Vec<f32>,

        /// Output mesh file (.ply)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Build a T-pillar and fit it to a scanned point cloud
    Fit {
        /// p1..p6: outer width, total height, cap height, base height, stem width, depth
        #[arg(long, value_delimiter = ',', required = true)]
        params: Vec<f32>,

        /// Target point cloud (.ply)
        #[arg(long)]
        scan: PathBuf,

        /// Output mesh file (.ply)
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        registration: RegistrationArgs,
    },

    /// Align an existing mesh to a scanned point cloud
    Align {
        /// Mesh to move (.ply)
        #[arg(long)]
        mesh: PathBuf,

        /// Target point cloud (.ply)
        #[arg(long)]
        scan: PathBuf,

        /// Output mesh file (.ply)
        #[arg(short, long)]
        output: PathBuf,

        /// Refine the bounding box alignment with GICP
        #[arg(long)]
        refine: bool,

        #[command(flatten)]
        registration: RegistrationArgs,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "pierfit_fitting=info,pierfit_algorithms=info,pierfit_io=info",
            2 => "pierfit_fitting=debug,pierfit_algorithms=debug,pierfit_io=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Generate { params, output } => commands::generate(params, output, &cli),
        Commands::Fit {
            params,
            scan,
            output,
            registration,
        } => commands::fit(params, scan, output, registration, &cli),
        Commands::Align {
            mesh,
            scan,
            output,
            refine,
            registration,
        } => commands::align(mesh, scan, output, *refine, registration, &cli),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            eprintln!("Error: {}", e);
            for cause in e.chain().skip(1) {
                eprintln!("  Caused by: {}", cause);
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
