//! Render hooks and options for raw-buffer tile sources.
//!
//! Services that ship tiles as raw binary pixel payloads need two
//! caller-supplied hooks to turn a payload into something drawable: a
//! [`BufferProcessor`] that decodes raw bytes into a structured pixel buffer
//! (bit-depth remap, channel unpacking) and a [`BufferRenderer`] that paints
//! a decoded buffer into an RGBA surface (channel fusion, brightness and
//! contrast). The core treats both as opaque capabilities and never
//! interprets [`RenderParams`].

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by the render hooks.
///
/// These are never terminal for a tile: the pipeline returns a best-effort
/// fallback and retries from scratch on the next access.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    /// The processor could not produce a usable decoded buffer.
    #[error("Buffer processing failed: {0}")]
    Process(String),

    /// The renderer failed to paint the decoded buffer.
    #[error("Buffer rendering failed: {0}")]
    Render(String),
}

/// A decoded pixel buffer produced by a [`BufferProcessor`].
///
/// Only the dimensions are meaningful to the core; the payload layout is a
/// private contract between the two hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBuffer {
    /// Buffer width in pixels.
    pub width: u32,
    /// Buffer height in pixels.
    pub height: u32,
    /// Opaque pixel payload.
    pub data: Bytes,
}

/// Decode hook: raw payload bytes into a structured pixel buffer.
///
/// The optional size is supplied when the payload came from an already
/// decoded image (pixel readback) rather than a raw service response.
pub trait BufferProcessor: Send + Sync {
    fn process(&self, raw: &[u8], size: Option<(u32, u32)>) -> Result<DecodedBuffer, RenderError>;
}

/// Render hook: paints a decoded buffer into the destination surface in
/// place.
pub trait BufferRenderer: Send + Sync {
    fn render(
        &self,
        dest: &mut RgbaImage,
        buffer: &DecodedBuffer,
        size: (u32, u32),
    ) -> Result<(), RenderError>;
}

/// Hook parameters the core carries but never interprets.
///
/// These correspond to the service's rendering controls (pixel depth,
/// channel count, channel fusion, brightness/contrast) and only the hooks
/// assign them meaning. Changing them is the typical reason to call
/// `clear_render_cache` and re-render without re-fetching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderParams {
    /// Bits per sample expected by the hooks.
    pub depth: Option<u8>,
    /// Number of channels in the raw payload.
    pub channels: Option<u8>,
    /// Channel fusion specification, e.g. `"0,255,255;255,0,255;:m"`.
    pub fuse: Option<String>,
    /// Brightness/contrast pair.
    pub brightness_contrast: Option<(f32, f32)>,
}

/// Configuration bundle for fetching and rendering tiles.
///
/// Shared read-only by reference across all tiles of a source.
#[derive(Clone)]
pub struct RenderOptions {
    use_raw_buffer: bool,
    params: RenderParams,
    processor: Arc<dyn BufferProcessor>,
    renderer: Arc<dyn BufferRenderer>,
}

impl RenderOptions {
    /// Create options around the two hooks, in encoded-image mode.
    pub fn new(processor: Arc<dyn BufferProcessor>, renderer: Arc<dyn BufferRenderer>) -> Self {
        Self {
            use_raw_buffer: false,
            params: RenderParams::default(),
            processor,
            renderer,
        }
    }

    /// Options with identity hooks that treat payloads as packed RGBA.
    pub fn passthrough() -> Self {
        let hooks = Arc::new(RgbaPassthrough);
        Self::new(hooks.clone(), hooks)
    }

    /// Select raw-buffer fetch mode.
    pub fn with_raw_buffer(mut self, use_raw_buffer: bool) -> Self {
        self.use_raw_buffer = use_raw_buffer;
        self
    }

    /// Attach hook parameters.
    pub fn with_params(mut self, params: RenderParams) -> Self {
        self.params = params;
        self
    }

    /// Whether tiles are fetched as raw binary pixel buffers.
    pub fn use_raw_buffer(&self) -> bool {
        self.use_raw_buffer
    }

    /// The opaque hook parameters.
    pub fn params(&self) -> &RenderParams {
        &self.params
    }

    /// The decode hook.
    pub fn processor(&self) -> &dyn BufferProcessor {
        self.processor.as_ref()
    }

    /// The render hook.
    pub fn renderer(&self) -> &dyn BufferRenderer {
        self.renderer.as_ref()
    }
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOptions")
            .field("use_raw_buffer", &self.use_raw_buffer)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Identity hooks: the payload is tightly packed 8-bit RGBA.
///
/// Useful as a default for services that pre-render server-side, and as a
/// concrete hook pair for tests and the CLI probe.
pub struct RgbaPassthrough;

impl BufferProcessor for RgbaPassthrough {
    fn process(&self, raw: &[u8], size: Option<(u32, u32)>) -> Result<DecodedBuffer, RenderError> {
        let (width, height) = match size {
            Some(size) => size,
            None => {
                // Raw payloads carry no dimensions; require a square RGBA
                // buffer and infer the edge from the byte count.
                let pixels = raw.len() / 4;
                let edge = (pixels as f64).sqrt() as u32;
                if raw.len() != (edge as usize) * (edge as usize) * 4 {
                    return Err(RenderError::Process(format!(
                        "Payload of {} bytes is not a square RGBA buffer",
                        raw.len()
                    )));
                }
                (edge, edge)
            }
        };
        if raw.len() != width as usize * height as usize * 4 {
            return Err(RenderError::Process(format!(
                "Expected {}×{}×4 bytes, got {}",
                width,
                height,
                raw.len()
            )));
        }
        Ok(DecodedBuffer {
            width,
            height,
            data: Bytes::copy_from_slice(raw),
        })
    }
}

impl BufferRenderer for RgbaPassthrough {
    fn render(
        &self,
        dest: &mut RgbaImage,
        buffer: &DecodedBuffer,
        _size: (u32, u32),
    ) -> Result<(), RenderError> {
        if dest.width() != buffer.width || dest.height() != buffer.height {
            return Err(RenderError::Render(format!(
                "Destination {}×{} does not match buffer {}×{}",
                dest.width(),
                dest.height(),
                buffer.width,
                buffer.height
            )));
        }
        if buffer.data.len() != dest.as_raw().len() {
            return Err(RenderError::Render(format!(
                "Buffer payload of {} bytes does not fill a {}×{} surface",
                buffer.data.len(),
                buffer.width,
                buffer.height
            )));
        }
        dest.copy_from_slice(&buffer.data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_round_trip() {
        let options = RenderOptions::passthrough();
        let raw: Vec<u8> = (0..2 * 2 * 4).map(|i| i as u8).collect();

        let buffer = options.processor().process(&raw, Some((2, 2))).unwrap();
        assert_eq!((buffer.width, buffer.height), (2, 2));

        let mut dest = RgbaImage::new(2, 2);
        options.renderer().render(&mut dest, &buffer, (2, 2)).unwrap();
        assert_eq!(dest.as_raw().as_slice(), raw.as_slice());
    }

    #[test]
    fn test_passthrough_infers_square_edge() {
        let options = RenderOptions::passthrough();
        let raw = vec![7u8; 4 * 4 * 4];

        let buffer = options.processor().process(&raw, None).unwrap();
        assert_eq!((buffer.width, buffer.height), (4, 4));
    }

    #[test]
    fn test_passthrough_rejects_ragged_payload() {
        let options = RenderOptions::passthrough();
        let result = options.processor().process(&[0u8; 13], None);
        assert!(matches!(result, Err(RenderError::Process(_))));
    }

    #[test]
    fn test_passthrough_rejects_size_mismatch() {
        let options = RenderOptions::passthrough();
        let buffer = DecodedBuffer {
            width: 2,
            height: 2,
            data: Bytes::from_static(&[0; 16]),
        };
        let mut dest = RgbaImage::new(3, 3);
        let result = options.renderer().render(&mut dest, &buffer, (2, 2));
        assert!(matches!(result, Err(RenderError::Render(_))));
    }

    #[test]
    fn test_passthrough_rejects_short_payload() {
        let options = RenderOptions::passthrough();
        let buffer = DecodedBuffer {
            width: 2,
            height: 2,
            data: Bytes::from_static(&[0; 8]),
        };
        let mut dest = RgbaImage::new(2, 2);
        let result = options.renderer().render(&mut dest, &buffer, (2, 2));
        assert!(matches!(result, Err(RenderError::Render(_))));
    }

    #[test]
    fn test_options_flags_and_params() {
        let params = RenderParams {
            depth: Some(8),
            channels: Some(3),
            fuse: Some("0,255,255;255,0,255;:m".to_string()),
            brightness_contrast: Some((50.0, 0.0)),
        };
        let options = RenderOptions::passthrough()
            .with_raw_buffer(true)
            .with_params(params.clone());

        assert!(options.use_raw_buffer());
        assert_eq!(options.params(), &params);
    }

    #[test]
    fn test_render_error_display() {
        let err = RenderError::Process("short buffer".to_string());
        assert_eq!(err.to_string(), "Buffer processing failed: short buffer");
    }
}
