//! Converter collaborator boundary.
//!
//! Turning a DOCX into a PDF is delegated to an external tool. The core
//! treats the converter as opaque: it hands over a source path and a
//! desired output path, then verifies only that the expected output file
//! materializes. Availability is probed once at startup and injected via
//! [`Capabilities`](tenderfold_shared::Capabilities), not read from
//! ambient state.

use std::path::Path;
use std::process::Command;

use tracing::{debug, info, instrument, warn};

use tenderfold_shared::{Result, TenderfoldError};

/// A document-to-PDF converter.
pub trait DocumentConverter {
    /// Convert `source` into a PDF at `output`.
    fn convert(&self, source: &Path, output: &Path) -> Result<()>;
}

/// LibreOffice headless converter (`soffice --headless --convert-to pdf`).
pub struct SofficeConverter {
    binary: String,
}

/// Locale used for the single retry when converted output carries no
/// extractable text. Headless LibreOffice under a C locale can mangle
/// CJK content.
const RETRY_LOCALE: &str = "zh_CN.UTF-8";

impl SofficeConverter {
    /// Probe for a working `soffice` binary.
    pub fn detect() -> Option<Self> {
        let binary = "soffice".to_string();
        let probe = Command::new(&binary).arg("--version").output();
        match probe {
            Ok(out) if out.status.success() => {
                info!("document converter available (soffice)");
                Some(Self { binary })
            }
            _ => {
                warn!("soffice not found, DOCX conversion disabled");
                None
            }
        }
    }

    fn run_once(&self, source: &Path, out_dir: &Path, locale: Option<&str>) -> Result<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg(source)
            .arg("--outdir")
            .arg(out_dir);
        if let Some(locale) = locale {
            cmd.env("LC_ALL", locale);
        }

        let output = cmd
            .output()
            .map_err(|e| TenderfoldError::convert(format!("spawning {}: {e}", self.binary)))?;
        if !output.status.success() {
            return Err(TenderfoldError::convert(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl DocumentConverter for SofficeConverter {
    #[instrument(skip_all, fields(source = %source.display(), output = %output.display()))]
    fn convert(&self, source: &Path, output: &Path) -> Result<()> {
        if !source.is_file() {
            return Err(TenderfoldError::convert(format!(
                "source document missing: {}",
                source.display()
            )));
        }
        let out_dir = output
            .parent()
            .ok_or_else(|| TenderfoldError::convert("output path has no parent directory"))?;
        std::fs::create_dir_all(out_dir).map_err(|e| TenderfoldError::io(out_dir, e))?;

        self.run_once(source, out_dir, None)?;

        // soffice names the result after the source stem.
        let stem = source
            .file_stem()
            .ok_or_else(|| TenderfoldError::convert("source has no file stem"))?;
        let generated = out_dir.join(Path::new(stem).with_extension("pdf"));

        if !generated.is_file() {
            return Err(TenderfoldError::convert(format!(
                "converter produced no output (expected {})",
                generated.display()
            )));
        }

        // Environment-language-sensitivity check: one retry under a CJK
        // locale when the produced PDF carries no extractable text.
        if !pdf_has_text(&generated) {
            warn!(pdf = %generated.display(), "no extractable text, retrying under {RETRY_LOCALE}");
            self.run_once(source, out_dir, Some(RETRY_LOCALE))?;
        }

        if generated != output {
            std::fs::rename(&generated, output).map_err(|e| TenderfoldError::io(output, e))?;
        }
        debug!("conversion complete");
        Ok(())
    }
}

/// Best-effort text-presence heuristic on the first page.
fn pdf_has_text(path: &Path) -> bool {
    match lopdf::Document::load(path) {
        Ok(doc) => doc
            .extract_text(&[1])
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::test_pdf;

    #[test]
    fn text_presence_heuristic() {
        let tmp = tempfile::tempdir().unwrap();
        let with_text = tmp.path().join("text.pdf");
        test_pdf::write_one_page(&with_text, "hello");
        assert!(pdf_has_text(&with_text));

        assert!(!pdf_has_text(&tmp.path().join("missing.pdf")));
    }

    #[test]
    fn missing_source_is_a_convert_error() {
        let converter = SofficeConverter {
            binary: "soffice".into(),
        };
        let tmp = tempfile::tempdir().unwrap();
        let err = converter
            .convert(&tmp.path().join("nope.docx"), &tmp.path().join("out.pdf"))
            .unwrap_err();
        assert!(matches!(err, TenderfoldError::Convert(_)));
    }
}
