//! Interchange types passed between importers, processors, and the compiler.

/// Pixel layout of texture content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceFormat {
    /// 8 bits per channel RGBA
    Rgba8,
    /// Packed 16-bit 5-6-5 RGB, alpha discarded
    Rgb565,
}

impl SurfaceFormat {
    /// Container tag byte for this format.
    pub fn tag(&self) -> u8 {
        match self {
            SurfaceFormat::Rgba8 => 0,
            SurfaceFormat::Rgb565 => 1,
        }
    }

    /// Parse a format name as used in processor parameters.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "color" | "rgba8" => Some(SurfaceFormat::Rgba8),
            "rgb565" | "bgr565" => Some(SurfaceFormat::Rgb565),
            _ => None,
        }
    }
}

/// In-memory texture, always held as RGBA8 until compiled.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureContent {
    pub width: u32,
    pub height: u32,
    pub format: SurfaceFormat,
    /// Tightly packed RGBA8 pixels, row-major
    pub pixels: Vec<u8>,
}

impl TextureContent {
    /// Create a texture from RGBA8 pixel data.
    ///
    /// The pixel buffer length must be `width * height * 4`.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), (width * height * 4) as usize);
        Self {
            width,
            height,
            format: SurfaceFormat::Rgba8,
            pixels,
        }
    }
}

/// An imported or processed content object.
///
/// Importers produce items, processors transform them, and the compiler
/// serializes the final item into the binary container.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentItem {
    Texture(TextureContent),
    Text(String),
    Blob(Vec<u8>),
}

impl ContentItem {
    /// Human-readable type name for log lines and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ContentItem::Texture(_) => "texture",
            ContentItem::Text(_) => "text",
            ContentItem::Blob(_) => "blob",
        }
    }
}
