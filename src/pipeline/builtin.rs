//! Compiled-in importers and processors.
//!
//! These cover the basic formats the pipeline handles out of the box;
//! hosts register further capabilities on the [`Registry`] at startup.

use std::path::Path;

use crate::build::{ImportContext, ProcessContext};
use crate::pipeline::{
    Color, ContentItem, Importer, ImporterInfo, ParameterSet, ParameterValue, Processor,
    ProcessorInfo, Registry, SurfaceFormat, TextureContent,
};

/// Register every compiled-in capability.
pub fn register_builtins(registry: &mut Registry) {
    registry.register_importer(ImporterInfo::new(
        "Texture",
        "Texture Importer",
        &["png", "jpg", "jpeg", "bmp", "tga", "gif"],
        "Texture",
        || Box::new(TextureImporter),
    ));
    registry.register_importer(ImporterInfo::new(
        "Effect",
        "Effect Importer",
        &["fx"],
        "Effect",
        || Box::new(EffectImporter),
    ));
    registry.register_importer(ImporterInfo::new(
        "Blob",
        "Raw Data Importer",
        &["bin", "dat"],
        "PassThrough",
        || Box::new(BlobImporter),
    ));

    registry.register_processor(ProcessorInfo::new(
        "Texture",
        "Texture Processor",
        |params| Box::new(TextureProcessor::from_parameters(params)),
    ));
    registry.register_processor(ProcessorInfo::new(
        "Effect",
        "Effect Processor",
        |params| Box::new(EffectProcessor::from_parameters(params)),
    ));
    registry.register_processor(ProcessorInfo::new(
        "PassThrough",
        "Pass-Through Processor",
        |_| Box::new(PassThroughProcessor),
    ));
}

/// Decodes image files into RGBA8 texture content.
pub struct TextureImporter;

impl Importer for TextureImporter {
    fn import(&self, source: &Path, _ctx: &mut ImportContext<'_>) -> Result<ContentItem, String> {
        let decoded = image::open(source).map_err(|e| e.to_string())?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(ContentItem::Texture(TextureContent::new(
            width,
            height,
            rgba.into_raw(),
        )))
    }
}

/// Reads effect source text.
pub struct EffectImporter;

impl Importer for EffectImporter {
    fn import(&self, source: &Path, _ctx: &mut ImportContext<'_>) -> Result<ContentItem, String> {
        let text = std::fs::read_to_string(source).map_err(|e| e.to_string())?;
        Ok(ContentItem::Text(text))
    }
}

/// Reads arbitrary bytes verbatim.
pub struct BlobImporter;

impl Importer for BlobImporter {
    fn import(&self, source: &Path, _ctx: &mut ImportContext<'_>) -> Result<ContentItem, String> {
        let bytes = std::fs::read(source).map_err(|e| e.to_string())?;
        Ok(ContentItem::Blob(bytes))
    }
}

/// Standard texture transformations: color keying, alpha premultiply,
/// power-of-two padding, and target surface format selection.
pub struct TextureProcessor {
    color_key_enabled: bool,
    color_key_color: Color,
    premultiply_alpha: bool,
    resize_to_power_of_two: bool,
    format: String,
}

impl TextureProcessor {
    pub fn from_parameters(params: &ParameterSet) -> Self {
        Self {
            color_key_enabled: params.get_bool("ColorKeyEnabled", false),
            color_key_color: params.get_color("ColorKeyColor", Color::MAGENTA),
            premultiply_alpha: params.get_bool("PremultiplyAlpha", true),
            resize_to_power_of_two: params.get_bool("ResizeToPowerOfTwo", false),
            format: params.get_text("Format", "color"),
        }
    }
}

impl Processor for TextureProcessor {
    fn parameters(&self) -> ParameterSet {
        ParameterSet::new()
            .with("ColorKeyEnabled", ParameterValue::Bool(self.color_key_enabled))
            .with("ColorKeyColor", ParameterValue::Color(self.color_key_color))
            .with(
                "PremultiplyAlpha",
                ParameterValue::Bool(self.premultiply_alpha),
            )
            .with(
                "ResizeToPowerOfTwo",
                ParameterValue::Bool(self.resize_to_power_of_two),
            )
            .with("Format", ParameterValue::Text(self.format.clone()))
    }

    fn process(
        &self,
        input: ContentItem,
        _ctx: &mut ProcessContext<'_>,
    ) -> Result<ContentItem, String> {
        let ContentItem::Texture(mut texture) = input else {
            return Err(format!("expected texture content, got {}", input.type_name()));
        };

        if self.color_key_enabled {
            apply_color_key(&mut texture, self.color_key_color);
        }
        if self.premultiply_alpha {
            premultiply(&mut texture);
        }
        if self.resize_to_power_of_two {
            pad_to_power_of_two(&mut texture);
        }

        texture.format = SurfaceFormat::parse(&self.format)
            .ok_or_else(|| format!("unknown surface format '{}'", self.format))?;

        Ok(ContentItem::Texture(texture))
    }
}

fn apply_color_key(texture: &mut TextureContent, key: Color) {
    for pixel in texture.pixels.chunks_exact_mut(4) {
        if pixel[0] == key.r && pixel[1] == key.g && pixel[2] == key.b && pixel[3] == key.a {
            pixel.fill(0);
        }
    }
}

fn premultiply(texture: &mut TextureContent) {
    for pixel in texture.pixels.chunks_exact_mut(4) {
        let a = pixel[3] as u32;
        pixel[0] = ((pixel[0] as u32 * a) / 255) as u8;
        pixel[1] = ((pixel[1] as u32 * a) / 255) as u8;
        pixel[2] = ((pixel[2] as u32 * a) / 255) as u8;
    }
}

fn pad_to_power_of_two(texture: &mut TextureContent) {
    let new_w = texture.width.next_power_of_two();
    let new_h = texture.height.next_power_of_two();
    if new_w == texture.width && new_h == texture.height {
        return;
    }

    let mut padded = vec![0u8; (new_w * new_h * 4) as usize];
    for row in 0..texture.height {
        let src_start = (row * texture.width * 4) as usize;
        let src_end = src_start + (texture.width * 4) as usize;
        let dst_start = (row * new_w * 4) as usize;
        padded[dst_start..dst_start + (texture.width * 4) as usize]
            .copy_from_slice(&texture.pixels[src_start..src_end]);
    }

    texture.width = new_w;
    texture.height = new_h;
    texture.pixels = padded;
}

/// Prepends preprocessor defines to effect source and emits the result as
/// an opaque compiled blob.
pub struct EffectProcessor {
    defines: String,
}

impl EffectProcessor {
    pub fn from_parameters(params: &ParameterSet) -> Self {
        Self {
            defines: params.get_text("Defines", ""),
        }
    }
}

impl Processor for EffectProcessor {
    fn parameters(&self) -> ParameterSet {
        ParameterSet::new().with("Defines", ParameterValue::Text(self.defines.clone()))
    }

    fn process(
        &self,
        input: ContentItem,
        _ctx: &mut ProcessContext<'_>,
    ) -> Result<ContentItem, String> {
        let ContentItem::Text(source) = input else {
            return Err(format!("expected effect source, got {}", input.type_name()));
        };

        let mut compiled = String::new();
        for define in self.defines.split(';').filter(|d| !d.is_empty()) {
            compiled.push_str("#define ");
            compiled.push_str(define.trim());
            compiled.push('\n');
        }
        compiled.push_str(&source);

        Ok(ContentItem::Blob(compiled.into_bytes()))
    }
}

/// Hands the imported item through unchanged.
pub struct PassThroughProcessor;

impl Processor for PassThroughProcessor {
    fn parameters(&self) -> ParameterSet {
        ParameterSet::new()
    }

    fn process(
        &self,
        input: ContentItem,
        _ctx: &mut ProcessContext<'_>,
    ) -> Result<ContentItem, String> {
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard() -> TextureContent {
        // 2x2: magenta, opaque red, half-transparent green, transparent
        let pixels = vec![
            255, 0, 255, 255, // magenta
            255, 0, 0, 255, // red
            0, 255, 0, 128, // green, half alpha
            0, 0, 0, 0, // transparent
        ];
        TextureContent::new(2, 2, pixels)
    }

    #[test]
    fn test_color_key_blanks_matching_pixels() {
        let mut tex = checkerboard();
        apply_color_key(&mut tex, Color::MAGENTA);
        assert_eq!(&tex.pixels[0..4], &[0, 0, 0, 0]);
        assert_eq!(&tex.pixels[4..8], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_premultiply_scales_by_alpha() {
        let mut tex = checkerboard();
        premultiply(&mut tex);
        // Opaque pixel unchanged
        assert_eq!(&tex.pixels[4..8], &[255, 0, 0, 255]);
        // Half-alpha green scaled down
        assert_eq!(tex.pixels[9], 128);
        assert_eq!(tex.pixels[11], 128);
    }

    #[test]
    fn test_pad_to_power_of_two() {
        let mut tex = TextureContent::new(3, 2, vec![7u8; 3 * 2 * 4]);
        pad_to_power_of_two(&mut tex);
        assert_eq!((tex.width, tex.height), (4, 2));
        assert_eq!(tex.pixels.len(), 4 * 2 * 4);
        // Original pixels preserved at row starts, padding zeroed
        assert_eq!(tex.pixels[0], 7);
        assert_eq!(tex.pixels[3 * 4], 0);
    }

    #[test]
    fn test_pad_noop_when_already_power_of_two() {
        let mut tex = TextureContent::new(4, 4, vec![1u8; 64]);
        let before = tex.pixels.clone();
        pad_to_power_of_two(&mut tex);
        assert_eq!(tex.pixels, before);
    }

    #[test]
    fn test_texture_processor_defaults() {
        let p = TextureProcessor::from_parameters(&ParameterSet::new());
        let defaults = p.parameters();
        assert_eq!(defaults.get("ColorKeyEnabled"), Some(&ParameterValue::Bool(false)));
        assert_eq!(defaults.get("PremultiplyAlpha"), Some(&ParameterValue::Bool(true)));
        assert_eq!(
            defaults.get("Format"),
            Some(&ParameterValue::Text("color".to_string()))
        );
    }

    #[test]
    fn test_effect_processor_prepends_defines() {
        let params = ParameterSet::new().with(
            "Defines",
            ParameterValue::Text("SKINNED;LIGHTS=4".to_string()),
        );
        let p = EffectProcessor::from_parameters(&params);
        let source = "float4 main() : COLOR { return 0; }".to_string();

        // The context is unused by this processor
        let mut manager = crate::build::test_support::manager();
        let out = crate::build::test_support::with_process_context(&mut manager, |ctx| {
            p.process(ContentItem::Text(source.clone()), ctx)
        })
        .unwrap();

        let ContentItem::Blob(bytes) = out else {
            panic!("expected blob");
        };
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("#define SKINNED\n#define LIGHTS=4\n"));
        assert!(text.ends_with(&source));
    }

    #[test]
    fn test_texture_processor_rejects_wrong_item() {
        let p = TextureProcessor::from_parameters(&ParameterSet::new());
        let mut manager = crate::build::test_support::manager();
        let err = crate::build::test_support::with_process_context(&mut manager, |ctx| {
            p.process(ContentItem::Text("nope".to_string()), ctx)
        })
        .unwrap_err();
        assert!(err.contains("expected texture"));
    }
}
