use crate::foundation::error::{MiiError, MiiResult};
use crate::protocol::settings::ResponseFormat;
use anyhow::Context as _;
use image::{ImageFormat, RgbaImage};
use image::imageops::{self, FilterType};
use std::path::Path;

/// Length of the header that precedes a raw frame body.
pub const RAW_HEADER_LEN: usize = 18;

/// A decoded frame as RGBA8 pixels.
///
/// Straight (non-premultiplied) alpha, tightly packed, row-major, top-left origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbaFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes.
    pub data: Vec<u8>,
}

impl RgbaFrame {
    /// Pixel at `(x, y)` counted from the top-left corner.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        self.data.get(i..i + 4).map(|p| [p[0], p[1], p[2], p[3]])
    }

    /// Convert into an [`image::RgbaImage`].
    pub fn into_image(self) -> MiiResult<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data)
            .ok_or_else(|| MiiError::render("frame buffer does not match its dimensions"))
    }

    /// Write the frame as a PNG, creating parent directories as needed.
    pub fn save_png(&self, path: impl AsRef<Path>) -> MiiResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create output directory '{}'", parent.display())
            })?;
        }
        image::save_buffer_with_format(
            path,
            &self.data,
            self.width,
            self.height,
            image::ColorType::Rgba8,
            ImageFormat::Png,
        )
        .with_context(|| format!("write png '{}'", path.display()))?;
        Ok(())
    }

    fn from_image(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }
}

/// Dimensions declared by a raw frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawFrameHeader {
    /// Frame width in pixels.
    pub width: u16,
    /// Frame height in pixels.
    pub height: u16,
}

impl RawFrameHeader {
    /// Parse the first [`RAW_HEADER_LEN`] bytes of a raw frame response.
    ///
    /// Only the dimension fields are read: width at bytes 12..14, height at 14..16.
    pub fn parse(header: &[u8]) -> MiiResult<Self> {
        if header.len() < RAW_HEADER_LEN {
            return Err(MiiError::render(format!(
                "truncated frame header: got {} of {RAW_HEADER_LEN} bytes",
                header.len()
            )));
        }
        Ok(Self {
            width: u16::from_le_bytes([header[12], header[13]]),
            height: u16::from_le_bytes([header[14], header[15]]),
        })
    }

    /// Number of BGRA body bytes that follow the header.
    pub fn body_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Decode an engine reply into a top-down RGBA frame of `output_size × output_size`.
///
/// `format` must be the response format the request declared. Frames whose decoded size differs
/// from `output_size` are resampled with Lanczos3.
pub fn decode_response(
    raw: &[u8],
    format: ResponseFormat,
    output_size: u32,
) -> MiiResult<RgbaFrame> {
    if output_size == 0 {
        return Err(MiiError::validation("output size must be non-zero"));
    }
    if raw.is_empty() {
        return Err(MiiError::render("engine sent an empty response"));
    }

    let img = match format {
        ResponseFormat::RawFrame => decode_raw_frame(raw)?,
        ResponseFormat::Image => decode_container(raw)?,
        ResponseFormat::Gltf => {
            return Err(MiiError::validation(
                "gltf responses carry a model, not pixels; export the container bytes instead",
            ));
        }
    };

    let img = if img.width() != output_size || img.height() != output_size {
        tracing::debug!(
            from_w = img.width(),
            from_h = img.height(),
            to = output_size,
            "resampling frame"
        );
        imageops::resize(&img, output_size, output_size, FilterType::Lanczos3)
    } else {
        img
    };

    Ok(RgbaFrame::from_image(img))
}

fn decode_raw_frame(raw: &[u8]) -> MiiResult<RgbaImage> {
    let header = RawFrameHeader::parse(raw)?;
    if header.width == 0 || header.height == 0 {
        return Err(MiiError::render(format!(
            "engine declared an empty {}x{} frame",
            header.width, header.height
        )));
    }

    let body = &raw[RAW_HEADER_LEN..];
    if body.len() != header.body_len() {
        return Err(MiiError::render(format!(
            "frame body is {} bytes, expected {} for {}x{}",
            body.len(),
            header.body_len(),
            header.width,
            header.height
        )));
    }

    let mut img = RgbaImage::from_raw(header.width as u32, header.height as u32, body.to_vec())
        .ok_or_else(|| MiiError::render("frame body does not match its header"))?;
    normalize_engine_pixels(&mut img);
    Ok(img)
}

fn decode_container(raw: &[u8]) -> MiiResult<RgbaImage> {
    // TGA has no signature; anything unrecognized is treated as one.
    let format = image::guess_format(raw).unwrap_or(ImageFormat::Tga);
    let dyn_img = image::load_from_memory_with_format(raw, format)
        .map_err(|e| MiiError::render(format!("decode {format:?} container: {e}")))?;
    let mut img = dyn_img.to_rgba8();
    if img.width() == 0 || img.height() == 0 {
        return Err(MiiError::render("image container holds an empty frame"));
    }
    // The TGA header declares BGRA order and row origin, which the decoder already applies.
    if format != ImageFormat::Tga {
        normalize_engine_pixels(&mut img);
    }
    Ok(img)
}

/// The engine writes BGRA rows bottom-up, also inside containers that cannot say so.
fn normalize_engine_pixels(img: &mut RgbaImage) {
    swap_red_blue_in_place(img);
    imageops::flip_vertical_in_place(img);
}

fn swap_red_blue_in_place(px: &mut [u8]) {
    for p in px.chunks_exact_mut(4) {
        p.swap(0, 2);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/protocol/response.rs"]
mod tests;
