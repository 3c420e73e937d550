//! Répertoire de travail temporaire d'une requête
//!
//! Tous les fichiers intermédiaires d'une conversion vivent dans un `Sandbox`.
//! Le répertoire est supprimé récursivement au `Drop`, quel que soit le chemin de
//! sortie (succès, erreur propagée par `?`, retour anticipé).

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::types::InputArtifact;
use crate::FormatError;

/// Sous-répertoire du fichier déposé, à l'écart des sorties
const INPUT_DIR: &str = "input";

#[derive(Debug)]
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    /// Crée un répertoire temporaire sous le répertoire temporaire système
    pub fn new() -> Result<Self, FormatError> {
        let dir = tempfile::Builder::new().prefix("geoconv-").tempdir()?;
        debug!(path = %dir.path().display(), "Sandbox created");
        Ok(Self { dir })
    }

    /// Crée le répertoire temporaire sous `parent`
    pub fn new_in(parent: &Path) -> Result<Self, FormatError> {
        let dir = tempfile::Builder::new()
            .prefix("geoconv-")
            .tempdir_in(parent)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Écrit le fichier reçu sous `input/` et retourne son chemin
    ///
    /// Le nom d'origine ne peut donc pas masquer un répertoire de sortie.
    pub fn stage(&self, input: &InputArtifact) -> Result<PathBuf, FormatError> {
        let path = self.subdir(INPUT_DIR)?.join(input.safe_file_name());
        fs::write(&path, &input.bytes)?;
        debug!(path = %path.display(), bytes = input.bytes.len(), "Input staged");
        Ok(path)
    }

    /// Crée (si besoin) un sous-répertoire du sandbox
    pub fn subdir(&self, name: &str) -> Result<PathBuf, FormatError> {
        let path = self.dir.path().join(name);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Supprime le répertoire en remontant l'éventuelle erreur
    pub fn close(self) -> Result<(), FormatError> {
        self.dir.close()?;
        Ok(())
    }
}

/// Supprime une sortie existante avant réécriture
pub(crate) fn remove_existing(path: &Path) -> Result<(), FormatError> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_removed_on_drop() {
        let path = {
            let sandbox = Sandbox::new().unwrap();
            let staged = sandbox
                .stage(&InputArtifact::new("a.csv", b"x,y\n1,2\n".to_vec()))
                .unwrap();
            assert!(staged.exists());
            sandbox.subdir("shp_output").unwrap();
            sandbox.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_sandbox_removed_on_error_path() {
        fn failing(root: &Path) -> Result<PathBuf, FormatError> {
            let sandbox = Sandbox::new_in(root)?;
            let path = sandbox.path().to_path_buf();
            std::fs::write(path.join("partial.shp"), b"partial")?;
            Err(FormatError::EmptyDataset(path.display().to_string()))
        }

        let root = tempfile::tempdir().unwrap();
        let err = failing(root.path()).unwrap_err();
        let FormatError::EmptyDataset(path) = err else {
            panic!("Expected EmptyDataset error");
        };
        assert!(!Path::new(&path).exists());
    }

    #[test]
    fn test_stage_strips_directories() {
        let sandbox = Sandbox::new().unwrap();
        let staged = sandbox
            .stage(&InputArtifact::new("../escape.las", vec![1, 2, 3]))
            .unwrap();
        assert_eq!(staged.parent().unwrap(), sandbox.path().join("input"));
        sandbox.close().unwrap();
    }
}
