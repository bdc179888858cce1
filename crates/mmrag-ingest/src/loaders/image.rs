use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use mmrag_core::command::{render, ToolCommand};
use mmrag_core::config::{CaptionSettings, LoaderSettings};
use mmrag_core::error::{Error, Result};
use mmrag_core::traits::DocumentLoader;
use mmrag_core::types::{Document, DocumentKind, LoadOutcome};

use super::{failure, file_name, list_or_fail};

/// Instructional images: OCR first, then a caption written by a vision or
/// text model from the OCR output. The caption is what gets embedded.
#[derive(Debug, Clone)]
pub struct ImageLoader {
    ocr: ToolCommand,
    ocr_timeout: Duration,
    caption: ToolCommand,
    caption_model: String,
    caption_prompt: String,
    caption_timeout: Duration,
}

impl ImageLoader {
    pub fn from_settings(loaders: &LoaderSettings, caption: &CaptionSettings) -> Self {
        Self {
            ocr: loaders.ocr.clone(),
            ocr_timeout: loaders.timeout(),
            caption: caption.command.clone(),
            caption_model: caption.model.clone(),
            caption_prompt: caption.prompt.clone(),
            caption_timeout: caption.timeout(),
        }
    }

    /// `Ok(None)` when the image has no recognisable text.
    fn describe(&self, path: &Path) -> Result<Option<Document>> {
        let absolute = fs::canonicalize(path)?;
        let absolute_str = absolute.to_string_lossy();
        let extraction = |e: Error| Error::Extraction { path: path.to_path_buf(), message: e.to_string() };

        let ocr = self
            .ocr
            .run_stdout(&HashMap::from([("path", absolute_str.as_ref())]), self.ocr_timeout)
            .map_err(extraction)?;
        let ocr = ocr.trim();
        if ocr.is_empty() {
            return Ok(None);
        }

        let prompt = render(&self.caption_prompt, &HashMap::from([("ocr_text", ocr)]));
        let vars = HashMap::from([("model", self.caption_model.as_str()), ("prompt", prompt.as_str())]);
        let caption = self.caption.run_stdout(&vars, self.caption_timeout).map_err(extraction)?;
        let caption = caption.trim();
        if caption.is_empty() {
            return Err(Error::Extraction { path: path.to_path_buf(), message: "caption model returned no text".into() });
        }

        Ok(Some(
            Document::new(file_name(path), DocumentKind::Image, caption)
                .with_extra("ocr_text", ocr)
                .with_extra("image_path", absolute_str.as_ref()),
        ))
    }
}

impl DocumentLoader for ImageLoader {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Image
    }

    fn load(&self, dir: &Path) -> LoadOutcome {
        let files = match list_or_fail(dir, DocumentKind::Image) {
            Ok(files) => files,
            Err(outcome) => return outcome,
        };
        let mut outcome = LoadOutcome::default();
        for path in files {
            match self.describe(&path) {
                Ok(Some(doc)) => {
                    info!(file = %path.display(), caption_len = doc.text.len(), "image captioned");
                    outcome.documents.push(doc);
                }
                Ok(None) => debug!(file = %path.display(), "no OCR text; skipping image"),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "image processing failed");
                    outcome.failures.push(failure(DocumentKind::Image, &path, e));
                }
            }
        }
        outcome
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn loader(ocr_script: &str, caption_script: &str) -> ImageLoader {
        ImageLoader {
            ocr: ToolCommand::new("sh", ["-c", ocr_script, "sh", "{path}"]),
            ocr_timeout: Duration::from_secs(10),
            caption: ToolCommand::new("sh", ["-c", caption_script, "sh", "{model}", "{prompt}"]),
            caption_model: "vision-test".into(),
            caption_prompt: "Describe:\n{ocr_text}\nCaption:".into(),
            caption_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn caption_becomes_text_and_ocr_goes_to_extra() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        std::fs::write(tmp.path().join("valve.png"), "png").expect("write");
        std::fs::write(tmp.path().join("blank.jpg"), "jpg").expect("write");

        let ocr = r#"case "$1" in *blank.jpg) echo "";; *) echo "RESET";; esac"#;
        // Echo the model and prompt so the test can see what was sent.
        let caption = r#"printf '%s|%s' "$1" "$2""#;
        let outcome = loader(ocr, caption).load(tmp.path());

        assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
        assert_eq!(outcome.documents.len(), 1);
        let doc = &outcome.documents[0];
        assert_eq!(doc.filename, "valve.png");
        assert_eq!(doc.text, "vision-test|Describe:\nRESET\nCaption:");
        assert_eq!(doc.extra["ocr_text"], "RESET");
        let image_path = doc.extra["image_path"].as_str().expect("string");
        assert!(Path::new(image_path).is_absolute());
        assert!(image_path.ends_with("valve.png"));
    }

    #[test]
    fn empty_caption_is_a_failure() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        std::fs::write(tmp.path().join("gauge.jpeg"), "jpeg").expect("write");
        let outcome = loader("echo PSI", "true").load(tmp.path());
        assert!(outcome.documents.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].kind, DocumentKind::Image);
    }
}
