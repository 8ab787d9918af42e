use crate::config::{ReportImageConfig, ReportsConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportImage {
    pub name: String,
    pub caption: String,
    pub available: bool,
}

/// Static training-report images shipped next to the model.
#[derive(Debug, Clone)]
pub struct ReportCatalog {
    report_dir: PathBuf,
    images: Vec<ReportImageConfig>,
}

impl ReportCatalog {
    pub fn new(config: &ReportsConfig) -> Self {
        Self {
            report_dir: config.report_dir.clone(),
            images: config.images.clone(),
        }
    }

    pub async fn list(&self) -> Vec<ReportImage> {
        let mut reports = Vec::with_capacity(self.images.len());
        for image in &self.images {
            let path = self.report_dir.join(&image.file);
            let available = tokio::fs::try_exists(&path).await.unwrap_or(false);
            if !available {
                tracing::warn!("Report image {} not found", path.display());
            }
            reports.push(ReportImage {
                name: image.file.clone(),
                caption: image.caption.clone(),
                available,
            });
        }
        reports
    }

    /// Bytes and content type of a configured report image. Names that are not
    /// part of the catalog are never read from disk.
    pub async fn read(&self, name: &str) -> Option<(Vec<u8>, &'static str)> {
        let image = self.images.iter().find(|image| image.file == name)?;
        let path = self.report_dir.join(&image.file);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Some((bytes, content_type(&path))),
            Err(e) => {
                tracing::warn!("Report image {} unreadable: {}", path.display(), e);
                None
            }
        }
    }
}

fn content_type(path: &Path) -> &'static str {
    match image::ImageFormat::from_path(path) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::Gif) => "image/gif",
        Ok(image::ImageFormat::WebP) => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn catalog(dir: &Path) -> ReportCatalog {
        ReportCatalog::new(&ReportsConfig {
            report_dir: dir.to_path_buf(),
            ..ReportsConfig::default()
        })
    }

    #[tokio::test]
    async fn test_missing_reports_are_listed_as_unavailable() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("training_accuracy.png"), b"png").unwrap();

        let reports = catalog(dir.path()).list().await;

        assert_eq!(
            reports,
            vec![
                ReportImage {
                    name: "training_accuracy.png".into(),
                    caption: "Training Accuracy".into(),
                    available: true,
                },
                ReportImage {
                    name: "training_loss.png".into(),
                    caption: "Training Loss".into(),
                    available: false,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_read_known_report() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("training_loss.png"), b"loss-curve").unwrap();

        let (bytes, content_type) = catalog(dir.path())
            .read("training_loss.png")
            .await
            .unwrap();

        assert_eq!(bytes, b"loss-curve");
        assert_eq!(content_type, "image/png");
    }

    #[tokio::test]
    async fn test_read_rejects_names_outside_catalog() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("secret.png"), b"nope").unwrap();
        let catalog = catalog(dir.path());

        assert!(catalog.read("secret.png").await.is_none());
        assert!(catalog.read("../secret.png").await.is_none());
        assert!(catalog.read("training_accuracy.png").await.is_none());
    }
}
