//! Wanted posters.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::{Error, Result};
use crate::record::CrimeReport;

/// A poster built from a confession.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WantedPoster<'a> {
    report: &'a CrimeReport,
}

impl<'a> WantedPoster<'a> {
    /// Poster for `report`.
    #[must_use]
    pub fn new(report: &'a CrimeReport) -> Self {
        Self { report }
    }

    /// Text rendering of the poster.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "🚨 WANTED 🚨");
        if self.report.photo.is_some() {
            let _ = writeln!(out, "[photo on file]");
        }
        let _ = writeln!(out, "NAME:    {}", self.report.display_name);
        let _ = writeln!(out, "ADDRESS: {}", self.report.address);
        let _ = write!(out, "CRIME:   {}", self.report.description);
        out
    }

    /// File name the photo is saved under.
    #[must_use]
    pub fn file_name(&self, at: DateTime<Utc>) -> String {
        format!(
            "wanted_{}_{}.jpg",
            self.report.file_safe_name(),
            at.timestamp_millis()
        )
    }

    /// Write the photo into `dir` and return its path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPhoto`] if there is no photo or it cannot be
    /// decoded, or an I/O error if the file cannot be written.
    pub fn save(&self, dir: &Path, at: DateTime<Utc>) -> Result<PathBuf> {
        let bytes = self
            .report
            .photo_bytes()?
            .ok_or_else(|| Error::InvalidPhoto("no photo captured".to_string()))?;

        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|source| Error::DirectoryCreate {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let path = dir.join(self.file_name(at));
        std::fs::write(&path, bytes)?;
        info!(path = %path.display(), "Poster saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn report() -> CrimeReport {
        CrimeReport {
            display_name: "Mary Ann Jones".to_string(),
            address: "9 Birch".to_string(),
            description: "Overdue library book".to_string(),
            photo: Some("data:image/jpeg;base64,aGVsbG8=".to_string()),
        }
    }

    #[test]
    fn test_render() {
        let report = report();
        let text = WantedPoster::new(&report).render();
        assert!(text.starts_with("🚨 WANTED 🚨"));
        assert!(text.contains("NAME:    Mary Ann Jones"));
        assert!(text.contains("CRIME:   Overdue library book"));
    }

    #[test]
    fn test_file_name() {
        let report = report();
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(
            WantedPoster::new(&report).file_name(at),
            "wanted_Mary_Ann_Jones_1700000000123.jpg"
        );
    }

    #[test]
    fn test_save_writes_photo() {
        let dir = std::env::temp_dir().join(format!("booth-poster-{}", std::process::id()));
        let report = report();
        let path = WantedPoster::new(&report).save(&dir, Utc::now()).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_save_without_photo_fails() {
        let mut report = report();
        report.photo = None;
        let err = WantedPoster::new(&report)
            .save(&std::env::temp_dir(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPhoto(_)));
    }
}
