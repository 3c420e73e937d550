//! Empaquetage des fichiers compagnons d'un shapefile en archive zip

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::FormatError;

/// Nom de l'archive livrée pour les sorties shapefile
pub const SHAPEFILE_ARCHIVE: &str = "shapefile.zip";

/// Extensions des compagnons, dans l'ordre d'ajout à l'archive
pub const SHAPEFILE_COMPANIONS: [&str; 5] = ["shp", "shx", "dbf", "prj", "cpg"];

/// Zippe les compagnons `<base>.<ext>` présents dans `folder`
///
/// Les compagnons absents sont ignorés sans erreur. Retourne les noms ajoutés.
pub fn bundle_shapefile(
    folder: &Path,
    base_name: &str,
    zip_path: &Path,
) -> Result<Vec<String>, FormatError> {
    let file = File::create(zip_path)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut members = Vec::new();
    for ext in SHAPEFILE_COMPANIONS {
        let name = format!("{}.{}", base_name, ext);
        let path = folder.join(&name);
        if !path.exists() {
            debug!(companion = %name, "Companion absent, skipped");
            continue;
        }

        let content = std::fs::read(&path)?;
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&content)?;
        members.push(name);
    }

    let mut writer = zip.finish()?;
    writer.flush()?;

    debug!(archive = %zip_path.display(), members = members.len(), "Shapefile bundled");
    Ok(members)
}

/// Supprime les compagnons existants d'un shapefile (écrasement, pas d'ajout)
pub fn remove_shapefile(shp_path: &Path) -> Result<(), FormatError> {
    for ext in SHAPEFILE_COMPANIONS {
        let path = shp_path.with_extension(ext);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch_companions(folder: &Path, exts: &[&str]) {
        for ext in exts {
            std::fs::write(folder.join(format!("points.{}", ext)), ext.as_bytes()).unwrap();
        }
    }

    fn archive_names(zip_path: &Path) -> Vec<String> {
        let file = File::open(zip_path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_bundle_all_companions() {
        let dir = tempfile::tempdir().unwrap();
        touch_companions(dir.path(), &SHAPEFILE_COMPANIONS);
        let zip_path = dir.path().join(SHAPEFILE_ARCHIVE);

        let members = bundle_shapefile(dir.path(), "points", &zip_path).unwrap();

        assert_eq!(members.len(), 5);
        assert_eq!(
            archive_names(&zip_path),
            vec!["points.shp", "points.shx", "points.dbf", "points.prj", "points.cpg"]
        );
    }

    #[test]
    fn test_bundle_without_cpg() {
        let dir = tempfile::tempdir().unwrap();
        touch_companions(dir.path(), &["shp", "shx", "dbf", "prj"]);
        let zip_path = dir.path().join(SHAPEFILE_ARCHIVE);

        let members = bundle_shapefile(dir.path(), "points", &zip_path).unwrap();

        assert_eq!(members, vec!["points.shp", "points.shx", "points.dbf", "points.prj"]);
        assert!(!archive_names(&zip_path).contains(&"points.cpg".to_string()));
    }

    #[test]
    fn test_bundle_ignores_other_base_names() {
        let dir = tempfile::tempdir().unwrap();
        touch_companions(dir.path(), &["shp", "dbf"]);
        std::fs::write(dir.path().join("other.shp"), b"x").unwrap();
        let zip_path = dir.path().join(SHAPEFILE_ARCHIVE);

        let members = bundle_shapefile(dir.path(), "points", &zip_path).unwrap();
        assert_eq!(members, vec!["points.shp", "points.dbf"]);
    }

    #[test]
    fn test_remove_shapefile() {
        let dir = tempfile::tempdir().unwrap();
        touch_companions(dir.path(), &SHAPEFILE_COMPANIONS);
        remove_shapefile(&dir.path().join("points.shp")).unwrap();
        for ext in SHAPEFILE_COMPANIONS {
            assert!(!dir.path().join(format!("points.{}", ext)).exists());
        }
    }
}
