//! Local tesseract binary, run once per document.
//!
//! The document is written to a named temp file and tesseract prints the
//! recognized text to stdout. The child is spawned with `kill_on_drop`, so
//! when the invoker's timeout drops the future the process is killed and the
//! temp file guard removes the file.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::OnceCell;

use super::{DocumentFormat, OcrBackend, OcrError, OcrInput, OcrOutput};
use crate::config::TesseractSettings;
use crate::sanitize;

const ENGINE: &str = "tesseract";
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TesseractBackend {
    settings: TesseractSettings,
    temp_dir: Option<PathBuf>,
    version: OnceCell<Option<String>>,
}

impl TesseractBackend {
    pub fn new(settings: TesseractSettings, temp_dir: Option<PathBuf>) -> Self {
        Self {
            settings,
            temp_dir,
            version: OnceCell::new(),
        }
    }

    fn program(&self) -> String {
        self.settings.binary_path.display().to_string()
    }

    fn temp_file(&self, format: DocumentFormat) -> Result<tempfile::NamedTempFile, OcrError> {
        let suffix = format!(".{}", format.extension());
        let mut builder = tempfile::Builder::new();
        builder.prefix("ocr_").suffix(&suffix);
        match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(OcrError::TempFile)
    }

    /// Engine version from `--version`, probed once per backend.
    async fn version(&self) -> Option<String> {
        self.version
            .get_or_init(|| async {
                let mut cmd = Command::new(&self.settings.binary_path);
                cmd.arg("--version")
                    .stdin(Stdio::null())
                    .kill_on_drop(true);
                let output = tokio::time::timeout(VERSION_PROBE_TIMEOUT, cmd.output())
                    .await
                    .ok()?
                    .ok()?;
                // Older releases print the banner on stderr.
                let banner = if output.stdout.is_empty() {
                    output.stderr
                } else {
                    output.stdout
                };
                parse_version(&String::from_utf8_lossy(&banner))
            })
            .await
            .clone()
    }
}

/// Tesseract joins multiple languages with `+`.
pub(crate) fn tesseract_language(language: &str) -> String {
    let parts: Vec<&str> = language
        .split([',', '+'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        "eng".to_string()
    } else {
        parts.join("+")
    }
}

fn parse_version(banner: &str) -> Option<String> {
    let first = banner.lines().next()?.trim();
    let version = first.strip_prefix("tesseract")?.trim();
    let version = version.strip_prefix('v').unwrap_or(version);
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

#[async_trait]
impl OcrBackend for TesseractBackend {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        format.is_image()
    }

    async fn recognize(&self, input: OcrInput<'_>) -> Result<OcrOutput, OcrError> {
        let temp = self.temp_file(input.format)?;
        tokio::fs::write(temp.path(), input.bytes)
            .await
            .map_err(OcrError::TempFile)?;

        let language = tesseract_language(input.language);
        let mut cmd = Command::new(&self.settings.binary_path);
        cmd.arg(temp.path())
            .arg("stdout")
            .arg("-l")
            .arg(&language);
        if let Some(psm) = self.settings.page_segmentation_mode {
            cmd.arg("--psm").arg(psm.to_string());
        }
        if let Some(tessdata) = &self.settings.tessdata_path {
            cmd.env("TESSDATA_PREFIX", tessdata);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            file = %sanitize::redact_path(temp.path()),
            language = %language,
            "Running tesseract"
        );

        let output = cmd.output().await.map_err(|e| OcrError::Spawn {
            program: self.program(),
            source: e,
        })?;

        // The temp file guard is still alive here and removes the file on drop.
        drop(temp);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(OcrError::Engine {
                engine: ENGINE,
                message: format!("exit status {}: {}", code, sanitize::diagnostic(&stderr)),
            });
        }

        if !output.stderr.is_empty() {
            tracing::debug!(
                stderr = %sanitize::diagnostic(&String::from_utf8_lossy(&output.stderr)),
                "tesseract diagnostics"
            );
        }

        Ok(OcrOutput {
            text: String::from_utf8_lossy(&output.stdout).into_owned(),
            engine: ENGINE,
            engine_version: self.version().await,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn fake_tesseract(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-tesseract");
        let script = format!(
            "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo 'tesseract 5.3.0'; exit 0; fi\n{}\n",
            body
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn backend(bin: PathBuf, temp_dir: &Path) -> TesseractBackend {
        TesseractBackend::new(
            TesseractSettings {
                binary_path: bin,
                page_segmentation_mode: Some(6),
                tessdata_path: None,
            },
            Some(temp_dir.to_path_buf()),
        )
    }

    fn input(language: &str) -> OcrInput<'_> {
        OcrInput {
            bytes: PNG_MAGIC,
            format: DocumentFormat::Png,
            language,
        }
    }

    fn is_empty_dir(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn test_tesseract_language() {
        assert_eq!(tesseract_language("eng"), "eng");
        assert_eq!(tesseract_language("eng, deu"), "eng+deu");
        assert_eq!(tesseract_language("eng+ind"), "eng+ind");
        assert_eq!(tesseract_language(""), "eng");
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(
            parse_version("tesseract 5.3.0\n leptonica-1.82.0"),
            Some("5.3.0".to_string())
        );
        assert_eq!(parse_version("tesseract v4.1.1"), Some("4.1.1".to_string()));
        assert_eq!(parse_version("something else"), None);
    }

    #[tokio::test]
    async fn test_recognize_returns_stdout() {
        let bin_dir = tempfile::tempdir().unwrap();
        let work_dir = tempfile::tempdir().unwrap();
        let bin = fake_tesseract(bin_dir.path(), "echo \"INVOICE INV-000123 lang=$4 psm=$6\"");

        let output = backend(bin, work_dir.path())
            .recognize(input("eng,deu"))
            .await
            .unwrap();

        assert_eq!(output.text.trim(), "INVOICE INV-000123 lang=eng+deu psm=6");
        assert_eq!(output.engine, "tesseract");
        assert_eq!(output.engine_version.as_deref(), Some("5.3.0"));
        assert!(is_empty_dir(work_dir.path()));
    }

    #[tokio::test]
    async fn test_temp_file_has_document_extension() {
        let bin_dir = tempfile::tempdir().unwrap();
        let work_dir = tempfile::tempdir().unwrap();
        let bin = fake_tesseract(bin_dir.path(), "basename \"$1\"");

        let output = backend(bin, work_dir.path())
            .recognize(input("eng"))
            .await
            .unwrap();

        let name = output.text.trim();
        assert!(name.starts_with("ocr_"), "{}", name);
        assert!(name.ends_with(".png"), "{}", name);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_engine_error() {
        let bin_dir = tempfile::tempdir().unwrap();
        let work_dir = tempfile::tempdir().unwrap();
        let bin = fake_tesseract(
            bin_dir.path(),
            "echo 'Error opening data file eng.traineddata' >&2\nexit 1",
        );

        let err = backend(bin, work_dir.path())
            .recognize(input("eng"))
            .await
            .unwrap_err();

        match err {
            OcrError::Engine { engine, message } => {
                assert_eq!(engine, "tesseract");
                assert!(message.contains("exit status 1"));
                assert!(message.contains("eng.traineddata"));
            }
            other => panic!("expected engine error, got {:?}", other),
        }
        assert!(is_empty_dir(work_dir.path()));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let work_dir = tempfile::tempdir().unwrap();
        let err = backend(PathBuf::from("/nonexistent/tesseract"), work_dir.path())
            .recognize(input("eng"))
            .await
            .unwrap_err();

        assert!(matches!(err, OcrError::Spawn { .. }));
        assert!(is_empty_dir(work_dir.path()));
    }

    #[tokio::test]
    async fn test_dropped_future_removes_temp_file() {
        let bin_dir = tempfile::tempdir().unwrap();
        let work_dir = tempfile::tempdir().unwrap();
        let bin = fake_tesseract(bin_dir.path(), "sleep 5\necho late");
        let backend = backend(bin, work_dir.path());

        let result =
            tokio::time::timeout(Duration::from_millis(200), backend.recognize(input("eng"))).await;

        assert!(result.is_err());
        assert!(is_empty_dir(work_dir.path()));
    }

    #[test]
    fn test_supports_images_only() {
        let backend = TesseractBackend::new(TesseractSettings::default(), None);
        assert!(backend.supports(DocumentFormat::Png));
        assert!(backend.supports(DocumentFormat::Tiff));
        assert!(!backend.supports(DocumentFormat::Pdf));
    }
}
