//! Aiguillage d'une demande de conversion vers le convertisseur de sa catégorie
//!
//! Une requête complète (`Dispatcher::process`) enchaîne : dépôt du fichier dans un
//! sandbox, classification, conversion, empaquetage, lecture de l'artefact. Le
//! sandbox est supprimé à la sortie de la fonction, erreur comprise.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::delimited::{csv_to_vector, PointColumns};
use crate::drivers::{self, DriverSpec, OutputLayout, DELIMITED_DRIVERS};
use crate::pointcloud::convert_point_cloud;
use crate::probe::Classifier;
use crate::raster::convert_raster;
use crate::sandbox::Sandbox;
use crate::types::{ConversionRequest, FormatCategory, InputArtifact, OutputArtifact, TargetFormat};
use crate::vector::convert_vector;
use crate::FormatError;

/// Nom de base des fichiers convertis (`converted.<ext>`)
pub const OUTPUT_STEM: &str = "converted";

/// Sous-répertoire des sorties, séparé du fichier déposé
const OUTPUT_DIR: &str = "output";

/// Sous-répertoire du shapefile issu d'un CSV
const SHP_OUTPUT_DIR: &str = "shp_output";

/// Artefact livré au terme d'une requête
#[derive(Debug, Clone)]
pub struct ConvertedFile {
    pub category: FormatCategory,
    pub target: TargetFormat,
    pub file_name: String,
    pub layout: OutputLayout,
    pub members: Vec<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    columns: PointColumns,
}

impl Dispatcher {
    pub fn new(columns: PointColumns) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &PointColumns {
        &self.columns
    }

    /// Construit une demande ; sans cible, le premier format de la catégorie est retenu
    pub fn request(
        &self,
        category: FormatCategory,
        target: Option<TargetFormat>,
        source: &Path,
    ) -> Result<ConversionRequest, FormatError> {
        let table = drivers::table_for(category).ok_or_else(|| {
            FormatError::unrecognized("input", format!("{} is not a supported file", source.display()))
        })?;
        let target = match target {
            Some(target) => table.lookup(target)?.target,
            None => table.targets().next().ok_or_else(|| {
                FormatError::unrecognized("input", "category has no output format")
            })?,
        };
        Ok(ConversionRequest {
            category,
            target,
            source: source.to_path_buf(),
        })
    }

    /// Chemin de sortie `converted.<ext>` dans `dir`
    pub fn output_path(spec: &DriverSpec, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{}", OUTPUT_STEM, spec.extension))
    }

    /// Exécute la conversion ; les sorties sont écrites sous `workdir`
    pub fn convert(
        &self,
        request: &ConversionRequest,
        workdir: &Path,
    ) -> Result<OutputArtifact, FormatError> {
        let source = request.source.as_path();
        match request.category {
            FormatCategory::DelimitedText => {
                DELIMITED_DRIVERS.lookup(request.target)?;
                csv_to_vector(source, &workdir.join(SHP_OUTPUT_DIR), &self.columns)
            }
            FormatCategory::Unsupported => Err(FormatError::UnsupportedTarget {
                category: request.category,
                target: request.target,
            }),
            category => {
                let spec = drivers::table_for(category)
                    .ok_or(FormatError::UnsupportedTarget {
                        category,
                        target: request.target,
                    })?
                    .lookup(request.target)?;
                let out_dir = workdir.join(OUTPUT_DIR);
                std::fs::create_dir_all(&out_dir)?;
                let output = Self::output_path(spec, &out_dir);

                match category {
                    FormatCategory::Vector => convert_vector(source, &output, request.target),
                    FormatCategory::Raster => convert_raster(source, &output, request.target),
                    _ => convert_point_cloud(source, &output, request.target),
                }
            }
        }
    }

    /// Traite un fichier reçu de bout en bout dans un sandbox temporaire
    pub fn process(
        &self,
        input: &InputArtifact,
        target: Option<TargetFormat>,
    ) -> Result<ConvertedFile, FormatError> {
        let sandbox = Sandbox::new()?;
        self.process_in(&sandbox, input, target)
    }

    /// Comme `process`, dans un sandbox fourni par l'appelant
    pub fn process_in(
        &self,
        sandbox: &Sandbox,
        input: &InputArtifact,
        target: Option<TargetFormat>,
    ) -> Result<ConvertedFile, FormatError> {
        let staged = sandbox.stage(input)?;
        let category = Classifier::new().classify(&staged);
        info!(file = %input.safe_file_name(), category = %category, "Input classified");

        let request = self.request(category, target, &staged)?;
        let artifact = self.convert(&request, sandbox.path())?;
        let bytes = std::fs::read(&artifact.path)?;

        Ok(ConvertedFile {
            category,
            target: request.target,
            file_name: artifact.file_name(),
            layout: artifact.layout,
            members: artifact.members,
            bytes,
        })
    }
}
