//! Classification d'un fichier par sondes successives
//!
//! Les sondes sont essayées dans un ordre fixe (vecteur, raster, nuage de points,
//! CSV). La première qui reconnaît le fichier fixe la catégorie ; une sonde en
//! échec est journalisée puis traitée comme négative.

use std::path::Path;

use tracing::debug;

use crate::types::FormatCategory;
use crate::vector::VectorDataset;
use crate::{pointcloud, raster, FormatError};

/// Résultat d'une sonde
#[derive(Debug)]
pub enum ProbeOutcome {
    /// Le fichier appartient à la catégorie de la sonde
    Match,
    /// Le fichier a été lu mais ne convient pas
    Miss,
    /// Le lecteur a échoué
    Failed(FormatError),
}

impl From<Result<bool, FormatError>> for ProbeOutcome {
    fn from(result: Result<bool, FormatError>) -> Self {
        match result {
            Ok(true) => Self::Match,
            Ok(false) => Self::Miss,
            Err(e) => Self::Failed(e),
        }
    }
}

/// Sonde rattachée à une catégorie
pub trait Probe {
    fn category(&self) -> FormatCategory;

    fn attempt(&self, path: &Path) -> ProbeOutcome;
}

/// Jeu vecteur avec au moins une couche
///
/// Un conteneur sans couche (GeoPackage vide) n'est pas considéré comme vecteur
/// et passe aux sondes suivantes.
pub struct VectorProbe;

impl Probe for VectorProbe {
    fn category(&self) -> FormatCategory {
        FormatCategory::Vector
    }

    fn attempt(&self, path: &Path) -> ProbeOutcome {
        VectorDataset::open(path)
            .map(|dataset| dataset.layer_count() > 0)
            .into()
    }
}

pub struct RasterProbe;

impl Probe for RasterProbe {
    fn category(&self) -> FormatCategory {
        FormatCategory::Raster
    }

    fn attempt(&self, path: &Path) -> ProbeOutcome {
        raster::probe(path).map(|(w, h)| w > 0 && h > 0).into()
    }
}

pub struct PointCloudProbe;

impl Probe for PointCloudProbe {
    fn category(&self) -> FormatCategory {
        FormatCategory::PointCloud
    }

    fn attempt(&self, path: &Path) -> ProbeOutcome {
        pointcloud::probe(path).map(|_| true).into()
    }
}

/// Reconnaissance par extension `.csv` seulement, le contenu n'est pas lu
pub struct DelimitedTextProbe;

impl Probe for DelimitedTextProbe {
    fn category(&self) -> FormatCategory {
        FormatCategory::DelimitedText
    }

    fn attempt(&self, path: &Path) -> ProbeOutcome {
        let is_csv = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            ProbeOutcome::Match
        } else {
            ProbeOutcome::Miss
        }
    }
}

/// Liste ordonnée de sondes
pub struct Classifier {
    probes: Vec<Box<dyn Probe>>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            probes: vec![
                Box::new(VectorProbe),
                Box::new(RasterProbe),
                Box::new(PointCloudProbe),
                Box::new(DelimitedTextProbe),
            ],
        }
    }
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catégories dans l'ordre d'essai
    pub fn order(&self) -> Vec<FormatCategory> {
        self.probes.iter().map(|p| p.category()).collect()
    }

    /// Première catégorie reconnue, `Unsupported` sinon
    pub fn classify(&self, path: &Path) -> FormatCategory {
        for probe in &self.probes {
            match probe.attempt(path) {
                ProbeOutcome::Match => {
                    debug!(path = %path.display(), category = %probe.category(), "Probe matched");
                    return probe.category();
                }
                ProbeOutcome::Miss => {
                    debug!(category = %probe.category(), "Probe missed");
                }
                ProbeOutcome::Failed(e) => {
                    debug!(category = %probe.category(), error = %e, "Probe failed");
                }
            }
        }
        FormatCategory::Unsupported
    }
}

/// Classe un fichier avec les sondes par défaut
pub fn classify(path: &Path) -> FormatCategory {
    Classifier::new().classify(path)
}
