//! Raster surfaces for `canvas` and `img` elements.
//!
//! The arena host has no image codecs. A raster is stored as raw RGBA and
//! exported as a `data:` URL whose payload is the base64 of a small header
//! (width, height as big-endian `u32`) followed by the pixels. The media
//! type is whatever the caller asked for, so round trips through a snapshot
//! are byte-exact.

use base64::Engine;
use thiserror::Error;

/// Pixels of a canvas or decoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// RGBA bytes, `width * height * 4` long.
    pub pixels: Vec<u8>,
}

/// Cross-origin readability of a raster.
///
/// [§ 4.12.5.1.5 Security with canvas elements](https://html.spec.whatwg.org/multipage/canvas.html#security-with-canvas-elements)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RasterAccess {
    /// Same-origin; always readable.
    #[default]
    Open,
    /// Cross-origin with CORS headers; readable once requested with
    /// `crossorigin="anonymous"`.
    CorsEnabled,
    /// Cross-origin without CORS; reading taints the canvas.
    Opaque,
}

/// Errors from encoding or decoding raster data URLs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RasterError {
    /// "The canvas has been tainted by cross-origin data."
    #[error("the raster has been tainted by cross-origin data")]
    Tainted,
    /// The `data:` URL is missing its comma or base64 marker.
    #[error("malformed data URL")]
    Malformed,
    /// The payload is not valid base64.
    #[error("base64 decode error: {0}")]
    Base64(String),
    /// The payload is shorter than its header claims.
    #[error("raster payload truncated")]
    Truncated,
}

impl Raster {
    /// A fully transparent raster of the given size.
    #[must_use]
    pub fn blank(width: u32, height: u32) -> Self {
        let len = (width as usize) * (height as usize) * 4;
        Self {
            width,
            height,
            pixels: vec![0; len],
        }
    }

    /// A raster filled with one RGBA colour.
    #[must_use]
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = (width as usize) * (height as usize);
        Self {
            width,
            height,
            pixels: rgba.repeat(count),
        }
    }

    /// Whether every pixel is fully transparent black.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|&b| b == 0)
    }

    /// `canvas.toDataURL(type)`
    #[must_use]
    pub fn to_data_url(&self, mime_type: &str) -> String {
        let mut payload = Vec::with_capacity(8 + self.pixels.len());
        payload.extend_from_slice(&self.width.to_be_bytes());
        payload.extend_from_slice(&self.height.to_be_bytes());
        payload.extend_from_slice(&self.pixels);
        let encoded = base64::engine::general_purpose::STANDARD.encode(payload);
        format!("data:{mime_type};base64,{encoded}")
    }

    /// Decode a data URL produced by [`Raster::to_data_url`].
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a base64 `data:` URL or its
    /// payload is truncated.
    pub fn from_data_url(data_url: &str) -> Result<Self, RasterError> {
        let rest = data_url
            .strip_prefix("data:")
            .ok_or(RasterError::Malformed)?;
        let (metadata, data) = rest.split_once(',').ok_or(RasterError::Malformed)?;
        if !metadata.ends_with(";base64") {
            return Err(RasterError::Malformed);
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| RasterError::Base64(e.to_string()))?;
        if bytes.len() < 8 {
            return Err(RasterError::Truncated);
        }
        let width = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let height = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let expected = (width as usize) * (height as usize) * 4;
        let pixels = bytes[8..].to_vec();
        if pixels.len() != expected {
            return Err(RasterError::Truncated);
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }
}
