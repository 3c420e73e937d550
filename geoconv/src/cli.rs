//! Définition et implémentation des commandes CLI
//!
//! - `detect`: catégorie d'un fichier et formats de sortie possibles
//! - `convert`: une requête complète (sandbox, détection, conversion, livraison)
//! - `formats`: tables des drivers de sortie

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::Subcommand;
use geoformat::drivers::{self, OutputLayout};
use geoformat::{classify, Dispatcher, FormatCategory, FormatError, InputArtifact, TargetFormat};
use serde::Serialize;
use tracing::{debug, info, warn};

use geoconv::{Config, ConversionReport};

#[derive(Subcommand)]
pub enum Commands {
    /// Detect the category of a file and list the formats it can be converted to
    Detect {
        /// Path to the input file
        path: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert a file to another format of the same family
    Convert {
        /// Path to the input file
        path: PathBuf,

        /// Target format (GeoJSON, GPKG, "ESRI Shapefile", KML, GTiff, COG, JPEG, PNG, csv, las, laz).
        /// Default: first format of the detected category
        #[arg(long)]
        to: Option<TargetFormat>,

        /// Output directory (défaut : env GEOCONV_OUTPUT_DIR / répertoire courant)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// X column of CSV point files (défaut : env GEOCONV_X_COLUMN / x)
        #[arg(long)]
        x_column: Option<String>,

        /// Y column of CSV point files (défaut : env GEOCONV_Y_COLUMN / y)
        #[arg(long)]
        y_column: Option<String>,

        /// Path to a JSON config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the conversion report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List output formats by category
    Formats,
}

/// Résultat de `detect`
#[derive(Debug, Serialize)]
pub struct Detection {
    pub file: String,
    pub category: FormatCategory,
    /// Noms des formats de sortie, le premier est le format par défaut
    pub targets: Vec<&'static str>,
}

/// Classe un fichier existant
pub fn detect(path: &Path) -> Result<Detection> {
    if !path.is_file() {
        anyhow::bail!("Input file not found: {}", path.display());
    }
    let category = classify(path);
    Ok(Detection {
        file: display_name(path),
        category,
        targets: category.targets().into_iter().map(|t| t.name()).collect(),
    })
}

/// Exécute la commande detect
pub fn cmd_detect(path: &Path, json: bool) -> Result<()> {
    let detection = detect(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detection)?);
        return Ok(());
    }

    println!("{}: {}", detection.file, detection.category);
    if detection.targets.is_empty() {
        println!("  Not a supported file");
    } else {
        println!("  Output formats: {}", detection.targets.join(", "));
    }
    Ok(())
}

/// Assemble la configuration : environnement, puis fichier, puis options
pub fn resolve_config(
    config_file: Option<&Path>,
    output: Option<PathBuf>,
    x_column: Option<String>,
    y_column: Option<String>,
) -> Result<Config> {
    let mut config = Config::from_env();
    if let Some(path) = config_file {
        config = config.merge(Config::load(path)?);
    }
    Ok(config.merge(Config {
        x_column,
        y_column,
        output_dir: output,
    }))
}

/// Exécute la commande convert et retourne le chemin du fichier livré
///
/// Le rapport est écrit même en cas d'échec.
pub fn cmd_convert(
    path: &Path,
    target: Option<TargetFormat>,
    config: &Config,
    report_path: Option<&Path>,
) -> Result<PathBuf> {
    let start = Instant::now();
    let mut report = ConversionReport::new(&display_name(path));

    let result = convert_into(path, target, config, &mut report);
    report.set_duration(start.elapsed());

    if let Err(ref e) = result {
        report.record_failure(&format!("{:#}", e));
    }

    if let Some(report_path) = report_path {
        report
            .save_to_file(report_path)
            .with_context(|| format!("Cannot write report {}", report_path.display()))?;
        info!(path = %report_path.display(), "Report saved");
    }

    if report.is_success() {
        report.display();
    } else {
        warn!("{}", report.summary());
    }

    result
}

fn convert_into(
    path: &Path,
    target: Option<TargetFormat>,
    config: &Config,
    report: &mut ConversionReport,
) -> Result<PathBuf> {
    let bytes = std::fs::read(path).with_context(|| format!("Cannot read {}", path.display()))?;
    let input = InputArtifact::new(display_name(path), bytes);

    let dispatcher = Dispatcher::new(config.point_columns());
    debug!(x = %dispatcher.columns().x, y = %dispatcher.columns().y, "CSV point columns");

    let converted = match dispatcher.process(&input, target) {
        Ok(converted) => converted,
        Err(e @ FormatError::UnrecognizedFormat { kind: "input", .. }) => {
            report.record_category(FormatCategory::Unsupported);
            return Err(anyhow!(e)).context("Not a supported file");
        }
        Err(e) => return Err(e).context("Conversion failed"),
    };

    let output_dir = config.output_dir();
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Cannot create {}", output_dir.display()))?;
    let output = output_dir.join(&converted.file_name);
    std::fs::write(&output, &converted.bytes)
        .with_context(|| format!("Cannot write {}", output.display()))?;

    report.record_output(&converted, checksum(&converted.bytes));

    info!(
        category = %converted.category,
        target = %converted.target,
        output = %output.display(),
        "File converted"
    );
    Ok(output)
}

/// Lignes de la table des formats, une par driver
pub fn format_lines() -> Vec<String> {
    let mut lines = Vec::new();
    for table in drivers::all_tables() {
        lines.push(format!("{}:", table.category));
        for (i, spec) in table.entries().iter().enumerate() {
            let layout = if spec.layout == OutputLayout::Bundle {
                " (zip)"
            } else {
                ""
            };
            let default = if i == 0 { " [default]" } else { "" };
            lines.push(format!(
                "  {:<16} .{}{}{}",
                spec.driver, spec.extension, layout, default
            ));
        }
    }
    lines
}

/// Exécute la commande formats
pub fn cmd_formats() -> Result<()> {
    for line in format_lines() {
        println!("{}", line);
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Checksum blake3 du fichier livré, calculé sur les octets déjà en mémoire
fn checksum(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
