use crate::error::{GenError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_RESOLUTION: Resolution = Resolution {
    width: 1024,
    height: 1024,
};

/// Aspect ratios the image model accepts.
const ASPECT_RATIOS: [(&str, f64); 10] = [
    ("1:1", 1.0),
    ("2:3", 2.0 / 3.0),
    ("3:2", 3.0 / 2.0),
    ("3:4", 3.0 / 4.0),
    ("4:3", 4.0 / 3.0),
    ("4:5", 4.0 / 5.0),
    ("5:4", 5.0 / 4.0),
    ("9:16", 9.0 / 16.0),
    ("16:9", 16.0 / 9.0),
    ("21:9", 21.0 / 9.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Closest supported aspect ratio, compared in log space so that 2:1 and
    /// 1:2 are equally far from 1:1.
    pub fn aspect_ratio(&self) -> &'static str {
        let target = (self.width as f64 / self.height as f64).ln();
        ASPECT_RATIOS
            .iter()
            .min_by(|(_, a), (_, b)| {
                (a.ln() - target)
                    .abs()
                    .total_cmp(&(b.ln() - target).abs())
            })
            .map(|(name, _)| *name)
            .unwrap_or("1:1")
    }

    pub fn size_tier(&self) -> &'static str {
        match self.width.max(self.height) {
            0..=1024 => "1K",
            1025..=2048 => "2K",
            _ => "4K",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = GenError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            GenError::Validation(format!(
                "resolution '{}' must look like <width>x<height> with positive integers",
                s
            ))
        };

        let (w, h) = s.trim().split_once('x').ok_or_else(invalid)?;
        let parse = |part: &str| -> Result<u32> {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            match part.parse::<u32>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(invalid()),
            }
        };

        Ok(Resolution {
            width: parse(w)?,
            height: parse(h)?,
        })
    }
}

/// A validated generation request. Built with [`GenerationRequest::builder`].
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
    style: Option<String>,
    resolution: Resolution,
    num_images: u32,
    output_path: Option<PathBuf>,
}

impl GenerationRequest {
    pub fn builder(prompt: impl Into<String>) -> GenerationRequestBuilder {
        GenerationRequestBuilder {
            prompt: prompt.into(),
            style: None,
            resolution: None,
            num_images: 1,
            output_path: None,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn style(&self) -> Option<&str> {
        self.style.as_deref()
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn num_images(&self) -> u32 {
        self.num_images
    }

    pub fn output_path(&self) -> Option<&PathBuf> {
        self.output_path.as_ref()
    }

    /// Copy of this request with `style` replacing any style it carried.
    pub fn with_style(&self, style: impl Into<String>) -> GenerationRequest {
        GenerationRequest {
            style: Some(style.into()),
            ..self.clone()
        }
    }

    /// The prompt text actually sent: style and resolution hints appended.
    pub fn enhanced_prompt(&self) -> String {
        let mut text = self.prompt.clone();
        if let Some(style) = &self.style {
            text.push_str(&format!(", in the style of {}", style.replace('_', " ")));
        }
        text.push_str(&format!(", high quality, {} resolution", self.resolution));
        text
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequestBuilder {
    prompt: String,
    style: Option<String>,
    resolution: Option<String>,
    num_images: u32,
    output_path: Option<PathBuf>,
}

impl GenerationRequestBuilder {
    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn maybe_style(mut self, style: Option<String>) -> Self {
        self.style = style;
        self
    }

    pub fn resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = Some(resolution.into());
        self
    }

    pub fn num_images(mut self, num_images: u32) -> Self {
        self.num_images = num_images;
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<GenerationRequest> {
        if self.prompt.trim().is_empty() {
            return Err(GenError::Validation("prompt must not be empty".into()));
        }
        if self.num_images == 0 {
            return Err(GenError::Validation(
                "number of images must be at least 1".into(),
            ));
        }
        let style = match self.style {
            Some(style) if style.trim().is_empty() => {
                return Err(GenError::Validation("style name must not be empty".into()))
            }
            other => other.map(|s| s.trim().to_string()),
        };
        let resolution = match self.resolution {
            Some(raw) => raw.parse()?,
            None => DEFAULT_RESOLUTION,
        };

        Ok(GenerationRequest {
            prompt: self.prompt,
            style,
            resolution,
            num_images: self.num_images,
            output_path: self.output_path,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Png,
    Jpeg,
    Webp,
    Gif,
}

impl ImageKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpg",
            ImageKind::Webp => "webp",
            ImageKind::Gif => "gif",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Webp => "image/webp",
            ImageKind::Gif => "image/gif",
        }
    }

    pub fn from_mime_type(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        image::ImageFormat::from_mime_type(essence).and_then(Self::from_format)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        image::ImageFormat::from_extension(ext).and_then(Self::from_format)
    }

    /// Detects the kind from magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        image::guess_format(bytes).ok().and_then(Self::from_format)
    }

    fn from_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Png => Some(ImageKind::Png),
            image::ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            image::ImageFormat::WebP => Some(ImageKind::Webp),
            image::ImageFormat::Gif => Some(ImageKind::Gif),
            _ => None,
        }
    }
}

/// One decoded image from the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub kind: ImageKind,
    pub dimensions: Option<(u32, u32)>,
}

impl GeneratedImage {
    /// Declared MIME type first, then magic bytes, then PNG.
    pub fn from_bytes(bytes: Vec<u8>, declared_mime: Option<&str>) -> Self {
        let kind = declared_mime
            .and_then(ImageKind::from_mime_type)
            .or_else(|| ImageKind::sniff(&bytes))
            .unwrap_or(ImageKind::Png);
        let dimensions = image::ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .ok()
            .and_then(|reader| reader.into_dimensions().ok());

        GeneratedImage {
            bytes,
            kind,
            dimensions,
        }
    }
}

/// Outcome of one generation call, held in memory until persisted.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub request_id: Uuid,
    pub model: String,
    pub request: GenerationRequest,
    pub enhanced_prompt: String,
    pub style_reference: Option<PathBuf>,
    pub images: Vec<GeneratedImage>,
    pub text: Option<String>,
    pub raw_metadata: serde_json::Value,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GenerationResult {
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}
