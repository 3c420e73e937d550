//! Point d'entrée CLI pour geoconv

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// Charger .env au démarrage
fn load_env() {
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::Commands;

/// Détecter et convertir des fichiers géospatiaux
#[derive(Parser)]
#[command(name = "geoconv")]
#[command(author, version)]
#[command(about = "Detect geospatial files and convert them to another format of the same family")]
#[command(long_about = "Détecte la famille d'un fichier (vecteur, raster, nuage de points, CSV de points) puis le convertit.\n\nLes Shapefiles sont livrés dans une archive shapefile.zip.")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Detect { path, json } => {
            cli::cmd_detect(&path, json)?;
        }
        Commands::Convert {
            path,
            to,
            output,
            x_column,
            y_column,
            config,
            report,
        } => {
            let config = cli::resolve_config(config.as_deref(), output, x_column, y_column)?;
            info!(path = %path.display(), target = ?to, "Conversion");
            let output = cli::cmd_convert(&path, to, &config, report.as_deref())?;
            println!("{}", output.display());
        }
        Commands::Formats => {
            cli::cmd_formats()?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
