//! Binary container writer.
//!
//! Compiled assets are written as a small framed container:
//!
//! ```text
//! offset  size  field
//! 0       3     magic "XNB"
//! 3       1     platform tag
//! 4       1     container version
//! 5       1     flags (0x01 hidef, 0x80 compressed)
//! 6       4     total file size, little-endian
//! 10      ...   payload (when compressed: u32 uncompressed size + RLE data)
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::pipeline::{ContentItem, GraphicsProfile, SurfaceFormat, TargetPlatform};

/// Container magic bytes.
pub const MAGIC: &[u8; 3] = b"XNB";

/// Container format version.
pub const VERSION: u8 = 5;

/// Flag bit: compiled against the full graphics feature set.
pub const FLAG_HIDEF: u8 = 0x01;

/// Flag bit: payload is compressed.
pub const FLAG_COMPRESSED: u8 = 0x80;

const HEADER_SIZE: usize = 10;

/// Serialize a final content item to the container format.
pub fn write_container(
    item: &ContentItem,
    dest: &Path,
    platform: TargetPlatform,
    profile: GraphicsProfile,
    compress: bool,
) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let payload = encode_payload(item);
    let body = if compress {
        let mut compressed = Vec::with_capacity(payload.len() / 2 + 8);
        compressed.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        rle_encode(&payload, &mut compressed);
        compressed
    } else {
        payload
    };

    let mut flags = 0u8;
    if profile == GraphicsProfile::HiDef {
        flags |= FLAG_HIDEF;
    }
    if compress {
        flags |= FLAG_COMPRESSED;
    }

    let total = (HEADER_SIZE + body.len()) as u32;

    let mut writer = BufWriter::new(File::create(dest)?);
    writer.write_all(MAGIC)?;
    writer.write_all(&[platform.tag(), VERSION, flags])?;
    writer.write_all(&total.to_le_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

fn encode_payload(item: &ContentItem) -> Vec<u8> {
    let mut out = Vec::new();
    match item {
        ContentItem::Texture(texture) => {
            out.push(1);
            out.extend_from_slice(&texture.width.to_le_bytes());
            out.extend_from_slice(&texture.height.to_le_bytes());
            out.push(texture.format.tag());
            match texture.format {
                SurfaceFormat::Rgba8 => out.extend_from_slice(&texture.pixels),
                SurfaceFormat::Rgb565 => {
                    for pixel in texture.pixels.chunks_exact(4) {
                        let packed = pack_565(pixel[0], pixel[1], pixel[2]);
                        out.extend_from_slice(&packed.to_le_bytes());
                    }
                }
            }
        }
        ContentItem::Text(text) => {
            out.push(2);
            out.extend_from_slice(&(text.len() as u32).to_le_bytes());
            out.extend_from_slice(text.as_bytes());
        }
        ContentItem::Blob(bytes) => {
            out.push(3);
            out.extend_from_slice(bytes);
        }
    }
    out
}

fn pack_565(r: u8, g: u8, b: u8) -> u16 {
    (((r as u16) >> 3) << 11) | (((g as u16) >> 2) << 5) | ((b as u16) >> 3)
}

/// Run-length encode: (count, byte) pairs with counts up to 255.
fn rle_encode(data: &[u8], out: &mut Vec<u8>) {
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        let mut run = 1usize;
        while i + run < data.len() && data[i + run] == byte && run < 255 {
            run += 1;
        }
        out.push(run as u8);
        out.push(byte);
        i += run;
    }
}

/// Inverse of [`rle_encode`].
pub fn rle_decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for pair in data.chunks_exact(2) {
        out.extend(std::iter::repeat(pair[1]).take(pair[0] as usize));
    }
    out
}
