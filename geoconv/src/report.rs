//! Rapport de conversion
//!
//! Un rapport par requête : catégorie détectée, format produit, fichiers livrés,
//! checksum et durée. Affiché en texte ou sérialisé en JSON.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use geoformat::{ConvertedFile, FormatCategory, OutputLayout, TargetFormat};
use serde::Serialize;

/// Statut de la requête
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConversionStatus {
    /// Fichier converti et livré
    Success,
    /// Aucune sonde n'a reconnu le fichier
    Unsupported,
    /// Erreur de lecture ou d'écriture
    Failed,
}

/// Rapport complet d'une conversion
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    /// Nom du fichier d'entrée
    pub input: String,
    pub status: ConversionStatus,
    pub category: Option<FormatCategory>,
    pub target: Option<TargetFormat>,

    /// Nom du fichier livré (`converted.<ext>` ou `shapefile.zip`)
    pub output: Option<String>,
    pub layout: Option<OutputLayout>,
    /// Fichiers contenus dans la sortie
    pub members: Vec<String>,
    pub size_bytes: u64,
    /// Checksum blake3 du fichier livré
    pub checksum: Option<String>,

    pub duration_secs: f64,
    pub error: Option<String>,
}

impl ConversionReport {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
            status: ConversionStatus::Success,
            category: None,
            target: None,
            output: None,
            layout: None,
            members: Vec::new(),
            size_bytes: 0,
            checksum: None,
            duration_secs: 0.0,
            error: None,
        }
    }

    /// Enregistre la catégorie détectée
    pub fn record_category(&mut self, category: FormatCategory) {
        self.category = Some(category);
        if category == FormatCategory::Unsupported {
            self.status = ConversionStatus::Unsupported;
        }
    }

    /// Enregistre l'artefact livré
    pub fn record_output(&mut self, converted: &ConvertedFile, checksum: String) {
        self.status = ConversionStatus::Success;
        self.category = Some(converted.category);
        self.target = Some(converted.target);
        self.output = Some(converted.file_name.clone());
        self.layout = Some(converted.layout);
        self.members = converted.members.clone();
        self.size_bytes = converted.bytes.len() as u64;
        self.checksum = Some(checksum);
    }

    /// Enregistre un échec ; une entrée non reconnue garde son statut `Unsupported`
    pub fn record_failure(&mut self, message: &str) {
        if self.status != ConversionStatus::Unsupported {
            self.status = ConversionStatus::Failed;
        }
        self.error = Some(message.to_string());
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    pub fn is_success(&self) -> bool {
        self.status == ConversionStatus::Success
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("CONVERSION REPORT - {}", self.input);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        if let Some(category) = self.category {
            println!("Category: {}", category);
        }
        if let Some(target) = self.target {
            println!("Target: {}", target);
        }

        if let Some(ref output) = self.output {
            println!("\n--- OUTPUT ---");
            println!("  {} ({} bytes)", output, self.size_bytes);
            if let Some(ref checksum) = self.checksum {
                println!("  blake3: {}", checksum);
            }
            if self.layout == Some(OutputLayout::Bundle) {
                for member in &self.members {
                    println!("    - {}", member);
                }
            }
        }

        if let Some(ref error) = self.error {
            println!("\n--- ERROR ---");
            println!("  {}", error);
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sérialise le rapport en JSON indenté
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        match (self.status, &self.output) {
            (ConversionStatus::Success, Some(output)) => format!(
                "{}: {} -> {} ({} bytes)",
                self.input,
                self.category.map(|c| c.label()).unwrap_or("?"),
                output,
                self.size_bytes
            ),
            (ConversionStatus::Unsupported, _) => {
                format!("{}: unsupported file", self.input)
            }
            _ => format!(
                "{}: failed ({})",
                self.input,
                self.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converted() -> ConvertedFile {
        ConvertedFile {
            category: FormatCategory::Vector,
            target: TargetFormat::EsriShapefile,
            file_name: "shapefile.zip".to_string(),
            layout: OutputLayout::Bundle,
            members: vec!["converted.shp".into(), "converted.dbf".into()],
            bytes: vec![0u8; 42],
        }
    }

    #[test]
    fn test_report_default_status() {
        let report = ConversionReport::new("communes.gpkg");
        assert_eq!(report.status, ConversionStatus::Success);
        assert!(report.output.is_none());
    }

    #[test]
    fn test_record_output() {
        let mut report = ConversionReport::new("communes.gpkg");
        report.record_category(FormatCategory::Vector);
        report.record_output(&converted(), "abc".to_string());

        assert!(report.is_success());
        assert_eq!(report.size_bytes, 42);
        assert_eq!(report.members.len(), 2);
        assert_eq!(
            report.summary(),
            "communes.gpkg: vector -> shapefile.zip (42 bytes)"
        );
    }

    #[test]
    fn test_unsupported_keeps_status() {
        let mut report = ConversionReport::new("notes.txt");
        report.record_category(FormatCategory::Unsupported);
        report.record_failure("not a supported file");

        assert_eq!(report.status, ConversionStatus::Unsupported);
        assert_eq!(report.summary(), "notes.txt: unsupported file");
    }

    #[test]
    fn test_failure() {
        let mut report = ConversionReport::new("points.csv");
        report.record_category(FormatCategory::DelimitedText);
        report.record_failure("Missing column 'x' in CSV header");

        assert_eq!(report.status, ConversionStatus::Failed);
        assert!(report.summary().contains("Missing column"));
    }

    #[test]
    fn test_to_json() {
        let mut report = ConversionReport::new("communes.gpkg");
        report.record_output(&converted(), "abc".to_string());
        report.set_duration(Duration::from_millis(1500));

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "Success");
        assert_eq!(json["category"], "Vector");
        assert_eq!(json["target"], "EsriShapefile");
        assert_eq!(json["layout"], "Bundle");
        assert_eq!(json["duration_secs"], 1.5);
    }
}
