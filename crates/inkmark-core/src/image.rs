//! Image decoding for image annotations
//!
//! PNG pixels are expanded to 8-bit, split into color and alpha planes and
//! Flate-compressed. JPEG data is passed through untouched as `DCTDecode`
//! after reading the frame header for its dimensions.

use crate::annotation::ImageFormat;
use crate::error::{InkmarkError, Result};
use crate::output::OutputDocument;
use base64::Engine;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Object, ObjectId, Stream};
use std::io::Write;

/// A decoded image ready to become an XObject
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub color_space: &'static str,
    pub filter: &'static str,
    pub data: Vec<u8>,
    /// Flate-compressed 8-bit alpha plane
    pub soft_mask: Option<Vec<u8>>,
}

/// Decode base64 image data (optionally a `data:` URL) of the declared format
pub fn decode_image(data: &str, format: ImageFormat) -> Result<DecodedImage> {
    let payload = match data.split_once(',') {
        Some((header, rest)) if header.starts_with("data:") => rest,
        _ => data,
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| InkmarkError::ImageDecode(format!("Invalid base64: {}", e)))?;

    match format {
        ImageFormat::Png => decode_png(&bytes),
        ImageFormat::Jpeg => decode_jpeg(bytes),
    }
}

fn decode_png(bytes: &[u8]) -> Result<DecodedImage> {
    let mut decoder = png::Decoder::new(std::io::Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .map_err(|e| InkmarkError::ImageDecode(format!("PNG header: {}", e)))?;
    let mut buffer = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buffer)
        .map_err(|e| InkmarkError::ImageDecode(format!("PNG data: {}", e)))?;
    let pixels = &buffer[..info.buffer_size()];

    let (color_space, color, alpha) = match info.color_type {
        png::ColorType::Grayscale => ("DeviceGray", pixels.to_vec(), None),
        png::ColorType::Rgb => ("DeviceRGB", pixels.to_vec(), None),
        png::ColorType::GrayscaleAlpha => {
            let (gray, alpha) = split_alpha(pixels, 1);
            ("DeviceGray", gray, Some(alpha))
        }
        png::ColorType::Rgba => {
            let (rgb, alpha) = split_alpha(pixels, 3);
            ("DeviceRGB", rgb, Some(alpha))
        }
        png::ColorType::Indexed => {
            return Err(InkmarkError::ImageDecode(
                "Indexed PNG was not expanded".into(),
            ))
        }
    };

    Ok(DecodedImage {
        width: info.width,
        height: info.height,
        color_space,
        filter: "FlateDecode",
        data: compress(&color)?,
        soft_mask: alpha.map(|a| compress(&a)).transpose()?,
    })
}

/// Split interleaved pixels into color channels and the trailing alpha channel
fn split_alpha(pixels: &[u8], color_channels: usize) -> (Vec<u8>, Vec<u8>) {
    let stride = color_channels + 1;
    let count = pixels.len() / stride;
    let mut color = Vec::with_capacity(count * color_channels);
    let mut alpha = Vec::with_capacity(count);
    for pixel in pixels.chunks_exact(stride) {
        color.extend_from_slice(&pixel[..color_channels]);
        alpha.push(pixel[color_channels]);
    }
    (color, alpha)
}

fn decode_jpeg(bytes: Vec<u8>) -> Result<DecodedImage> {
    let (width, height, components) = jpeg_frame_header(&bytes)?;
    let color_space = match components {
        1 => "DeviceGray",
        4 => "DeviceCMYK",
        _ => "DeviceRGB",
    };
    Ok(DecodedImage {
        width,
        height,
        color_space,
        filter: "DCTDecode",
        data: bytes,
        soft_mask: None,
    })
}

/// Read width, height and component count from the first SOF marker
fn jpeg_frame_header(data: &[u8]) -> Result<(u32, u32, u8)> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(InkmarkError::ImageDecode("Not a JPEG stream".into()));
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = data[pos + 1];
        pos += 2;
        if marker == 0xFF || marker == 0x00 || (0xD0..=0xD7).contains(&marker) {
            continue;
        }

        let is_frame = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            if pos + 8 > data.len() {
                return Err(InkmarkError::ImageDecode("Truncated JPEG frame header".into()));
            }
            let height = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as u32;
            let width = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
            if width == 0 || height == 0 {
                return Err(InkmarkError::ImageDecode("JPEG has zero dimensions".into()));
            }
            return Ok((width, height, data[pos + 7]));
        }

        if pos + 2 > data.len() {
            break;
        }
        let length = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
        pos += length;
    }

    Err(InkmarkError::ImageDecode("No JPEG frame header found".into()))
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| InkmarkError::ImageDecode(format!("Compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| InkmarkError::ImageDecode(format!("Compression failed: {}", e)))
}

/// Add the image (and its soft mask) to the output document as an XObject
pub fn add_image_xobject(output: &mut OutputDocument, image: DecodedImage) -> ObjectId {
    let doc = output.document_mut();

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width as i64,
        "Height" => image.height as i64,
        "ColorSpace" => image.color_space,
        "BitsPerComponent" => 8,
        "Filter" => image.filter,
    };

    if let Some(mask) = image.soft_mask {
        let mask_dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width as i64,
            "Height" => image.height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        };
        let mask_id = doc.add_object(Stream::new(mask_dict, mask));
        dict.set("SMask", Object::Reference(mask_id));
    }

    doc.add_object(Stream::new(dict, image.data))
}
