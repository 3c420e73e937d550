//! Configuration de l'outil
//!
//! Trois sources, de la plus faible à la plus forte : variables d'environnement
//! (`.env` compris), fichier JSON, options de la ligne de commande.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use geoformat::PointColumns;

pub const ENV_X_COLUMN: &str = "GEOCONV_X_COLUMN";
pub const ENV_Y_COLUMN: &str = "GEOCONV_Y_COLUMN";
pub const ENV_OUTPUT_DIR: &str = "GEOCONV_OUTPUT_DIR";

/// Configuration principale
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Colonne X (longitude) des CSV de points
    pub x_column: Option<String>,

    /// Colonne Y (latitude) des CSV de points
    pub y_column: Option<String>,

    /// Répertoire où déposer le fichier converti
    pub output_dir: Option<PathBuf>,
}

impl Config {
    /// Lit les variables `GEOCONV_*` de l'environnement
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            x_column: non_empty(ENV_X_COLUMN),
            y_column: non_empty(ENV_Y_COLUMN),
            output_dir: non_empty(ENV_OUTPUT_DIR).map(PathBuf::from),
        }
    }

    /// Charge une configuration depuis un fichier JSON
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Les valeurs définies dans `other` remplacent celles de `self`
    pub fn merge(self, other: Config) -> Self {
        Self {
            x_column: other.x_column.or(self.x_column),
            y_column: other.y_column.or(self.y_column),
            output_dir: other.output_dir.or(self.output_dir),
        }
    }

    /// Colonnes de coordonnées, `x`/`y` par défaut
    pub fn point_columns(&self) -> PointColumns {
        let defaults = PointColumns::default();
        PointColumns::new(
            self.x_column.clone().unwrap_or(defaults.x),
            self.y_column.clone().unwrap_or(defaults.y),
        )
    }

    /// Répertoire de sortie, répertoire courant par défaut
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
