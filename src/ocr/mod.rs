//! Text recognition for image and video elements.
//!
//! Recognition only ever runs in the page world; the content world reaches it
//! through the window bridge.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId};

pub use ocr_rs::OcrEngine;

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("engine initialization failed: {message}")]
    EngineInit { message: String },
    #[error("image conversion failed: {message}")]
    ImageConversion { message: String },
    #[error("recognition failed: {message}")]
    Recognition { message: String },
    #[error("element is not an image or video")]
    UnsupportedElement,
    #[error("element has no frame source: {message}")]
    MissingSource { message: String },
}

pub type OcrResult<T> = Result<T, OcrError>;

const SYSTEM_MODEL_DIR: &str = "/usr/share/got-clue/models";
const DETECTION_MODEL: &str = "PP-OCRv5_mobile_det.mnn";
const RECOGNITION_MODEL: &str = "en_PP-OCRv5_mobile_rec_infer.mnn";
const RECOGNITION_KEYS: &str = "ppocr_keys_en.txt";

/// How an element is treated when it is picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Image,
    Video,
    Html,
}

impl ElementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Html => "html",
        }
    }

    pub fn is_media(self) -> bool {
        matches!(self, Self::Image | Self::Video)
    }
}

/// `IMG`, `CANVAS` and anything with an inline background image count as
/// images; `VIDEO` is a video; everything else is markup.
pub fn classify_element(doc: &Document, node: NodeId) -> ElementKind {
    match doc.tag_name(node) {
        Some("img") | Some("canvas") => ElementKind::Image,
        Some("video") => ElementKind::Video,
        Some(_) if has_background_image(doc, node) => ElementKind::Image,
        _ => ElementKind::Html,
    }
}

fn has_background_image(doc: &Document, node: NodeId) -> bool {
    doc.style(node)
        .and_then(|style| style.get("background-image"))
        .is_some_and(|value| !value.trim().is_empty() && value.trim() != "none")
}

fn background_image_url(value: &str) -> Option<&str> {
    let inner = value.trim().strip_prefix("url(")?.strip_suffix(')')?;
    let inner = inner.trim().trim_matches(|ch| ch == '"' || ch == '\'');
    (!inner.is_empty()).then_some(inner)
}

/// Where the pixels of a media element come from.
pub fn frame_source(doc: &Document, node: NodeId) -> OcrResult<String> {
    let missing = |message: &str| OcrError::MissingSource {
        message: message.to_string(),
    };
    match doc.tag_name(node) {
        Some("img") => doc
            .attribute(node, "src")
            .filter(|src| !src.is_empty())
            .map(str::to_string)
            .ok_or_else(|| missing("image has no src")),
        Some("video") => doc
            .attribute(node, "data-frame")
            .or_else(|| doc.attribute(node, "poster"))
            .filter(|src| !src.is_empty())
            .map(str::to_string)
            .ok_or_else(|| missing("video has no captured frame or poster")),
        Some("canvas") => doc
            .attribute(node, "data-frame")
            .filter(|src| !src.is_empty())
            .map(str::to_string)
            .ok_or_else(|| missing("canvas has no snapshot")),
        Some(_) => doc
            .style(node)
            .and_then(|style| style.get("background-image"))
            .and_then(background_image_url)
            .map(str::to_string)
            .ok_or(OcrError::UnsupportedElement),
        None => Err(OcrError::UnsupportedElement),
    }
}

/// Anything that can turn a frame into text.
pub trait TextRecognizer: Send {
    fn recognize(&self, source: &str) -> OcrResult<String>;
}

/// PaddleOCR-backed recognizer that loads frames from local paths.
pub struct PaddleRecognizer {
    engine: OcrEngine,
    base_dir: PathBuf,
}

impl PaddleRecognizer {
    pub fn new(engine: OcrEngine, base_dir: PathBuf) -> Self {
        Self { engine, base_dir }
    }

    pub fn from_model_dir(model_dir: &Path, base_dir: PathBuf) -> OcrResult<Self> {
        Ok(Self::new(create_engine(model_dir)?, base_dir))
    }

    fn resolve_path(&self, source: &str) -> PathBuf {
        let source = source.strip_prefix("file://").unwrap_or(source);
        let path = Path::new(source);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl TextRecognizer for PaddleRecognizer {
    fn recognize(&self, source: &str) -> OcrResult<String> {
        let remote = source.contains("://") && !source.starts_with("file://");
        if source.starts_with("data:") || remote {
            return Err(OcrError::ImageConversion {
                message: format!("unsupported frame source: {source}"),
            });
        }
        let path = self.resolve_path(source);
        let image = image::open(&path).map_err(|err| OcrError::ImageConversion {
            message: format!("failed to open image {}: {err}", path.display()),
        })?;
        recognize_text(&self.engine, &image)
    }
}

pub fn resolve_model_dir() -> Option<PathBuf> {
    let user_dir = std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|val| !val.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".local/share"))
        })
        .map(|base| base.join("got-clue/models"));

    if let Some(dir) = user_dir.filter(|dir| dir.is_dir()) {
        return Some(dir);
    }

    let system_dir = PathBuf::from(SYSTEM_MODEL_DIR);
    system_dir.is_dir().then_some(system_dir)
}

pub fn create_engine(model_dir: &Path) -> OcrResult<OcrEngine> {
    let det_path = model_dir.join(DETECTION_MODEL);
    let rec_path = model_dir.join(RECOGNITION_MODEL);
    let keys_path = model_dir.join(RECOGNITION_KEYS);

    OcrEngine::new(
        det_path.to_str().unwrap_or_default(),
        rec_path.to_str().unwrap_or_default(),
        keys_path.to_str().unwrap_or_default(),
        None,
    )
    .map_err(|err| OcrError::EngineInit {
        message: err.to_string(),
    })
}

/// Runs recognition and joins the detected lines top to bottom.
pub fn recognize_text(engine: &OcrEngine, image: &DynamicImage) -> OcrResult<String> {
    let results = engine
        .recognize(image)
        .map_err(|err| OcrError::Recognition {
            message: err.to_string(),
        })?;

    let lines = results
        .into_iter()
        .map(|r| (r.bbox.rect.top() as f64, r.text))
        .collect();
    Ok(join_lines_top_down(lines))
}

fn join_lines_top_down(mut lines: Vec<(f64, String)>) -> String {
    lines.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    lines
        .into_iter()
        .map(|(_, text)| text)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
