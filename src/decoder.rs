//! Frame decoding.
//!
//! Turns one image component of a fetched buffer into an owned, 8-bit [`Frame`]:
//!
//! - Mono and Bayer formats become a `rows x cols` array. Bayer data is not debayered.
//! - RGB(a) and BGR(a) formats become a `rows x cols x channels` array in RGB(a) order.
//! - Samples wider than 8 bits are scaled down by `2^(bits - 8)` with integer division.
//!
//! Everything else (YUV, vendor-specific and unknown codes) is rejected with
//! [`BridgeError::UnsupportedPixelFormat`]. The decoded frame owns its pixels, so the buffer
//! can be queued back as soon as [`decode`] returns.

use chrono::{DateTime, Utc};
use ndarray::{Array2, Array3, Axis};

use crate::error::{BridgeError, BridgeResult};
use crate::genicam::pfnc::{self, PixelFamily};
use crate::genicam::{ImageComponent, Samples};

/// Axis labels of a single-plane frame.
pub const PLANAR_DIMS: &[&str] = &["rows", "cols"];
/// Axis labels of a colour frame.
pub const COLOR_DIMS: &[&str] = &["rows", "cols", "channels"];

/// Decoded pixels.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    /// Mono or raw Bayer plane.
    Mono(Array2<u8>),
    /// Interleaved RGB or RGBa.
    Color(Array3<u8>),
}

/// One decoded camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Pixels, shaped as described by [`Frame::dims`].
    pub data: FrameData,
    /// PFNC name of the source format.
    pub format: &'static str,
    /// Position in the acquisition stream, assigned by the session.
    pub sequence: u64,
    /// Wall-clock time of decoding.
    pub timestamp: DateTime<Utc>,
}

impl Frame {
    /// Axis labels matching the shape of [`Frame::data`].
    pub fn dims(&self) -> &'static [&'static str] {
        match self.data {
            FrameData::Mono(_) => PLANAR_DIMS,
            FrameData::Color(_) => COLOR_DIMS,
        }
    }

    /// Pixels per row.
    pub fn width(&self) -> usize {
        match &self.data {
            FrameData::Mono(a) => a.ncols(),
            FrameData::Color(a) => a.len_of(Axis(1)),
        }
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        match &self.data {
            FrameData::Mono(a) => a.nrows(),
            FrameData::Color(a) => a.len_of(Axis(0)),
        }
    }

    /// Samples per pixel, 1 for mono frames.
    pub fn channels(&self) -> usize {
        match &self.data {
            FrameData::Mono(_) => 1,
            FrameData::Color(a) => a.len_of(Axis(2)),
        }
    }

    /// Mean grey level over every sample. Used for headless frame statistics.
    pub fn mean(&self) -> f64 {
        let (sum, count) = match &self.data {
            FrameData::Mono(a) => (a.iter().map(|&v| u64::from(v)).sum::<u64>(), a.len()),
            FrameData::Color(a) => (a.iter().map(|&v| u64::from(v)).sum::<u64>(), a.len()),
        };
        if count == 0 {
            0.0
        } else {
            sum as f64 / count as f64
        }
    }
}

/// Decode `component` into an owned 8-bit frame.
pub fn decode(component: &ImageComponent<'_>) -> BridgeResult<Frame> {
    let code = component.data_format;
    let unsupported = || BridgeError::UnsupportedPixelFormat {
        code,
        name: pfnc::describe(code),
    };
    if pfnc::is_custom(code) {
        return Err(unsupported());
    }
    let format = pfnc::lookup(code).ok_or_else(unsupported)?;

    let channels = match format.family {
        PixelFamily::Mono | PixelFamily::Bayer => 1,
        PixelFamily::Rgb | PixelFamily::Rgba | PixelFamily::Bgr | PixelFamily::Bgra => {
            format.channels
        }
        PixelFamily::Yuv => return Err(unsupported()),
    };
    if component.num_components_per_pixel != channels {
        return Err(BridgeError::Decode(format!(
            "{format} has {channels} components per pixel, buffer declares {}",
            component.num_components_per_pixel
        )));
    }

    let (rows, cols) = (component.height, component.width);
    let expected = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| {
            BridgeError::Decode(format!("{format} {cols}x{rows} overflows the address space"))
        })?;
    if component.data.len() != expected {
        return Err(BridgeError::Decode(format!(
            "{format} {cols}x{rows} needs {expected} samples, buffer holds {}",
            component.data.len()
        )));
    }

    let pixels: Vec<u8> = match (component.data, format.bits_per_channel) {
        (Samples::U8(data), 8) => data.to_vec(),
        (Samples::U16(data), bits) if bits > 8 => {
            let shift = bits - 8;
            data.iter().map(|&v| (v >> shift) as u8).collect()
        }
        (Samples::U8(_), bits) | (Samples::U16(_), bits) => {
            return Err(BridgeError::Decode(format!(
                "{format} is {bits} bits per sample, buffer sample width does not match"
            )));
        }
    };

    let data = if channels == 1 {
        let plane = Array2::from_shape_vec((rows, cols), pixels)
            .map_err(|e| BridgeError::Decode(e.to_string()))?;
        FrameData::Mono(plane)
    } else {
        let image = Array3::from_shape_vec((rows, cols, channels), pixels)
            .map_err(|e| BridgeError::Decode(e.to_string()))?;
        let image = match format.family {
            PixelFamily::Bgr => image.select(Axis(2), &[2, 1, 0]),
            PixelFamily::Bgra => image.select(Axis(2), &[2, 1, 0, 3]),
            _ => image,
        };
        FrameData::Color(image)
    };

    Ok(Frame {
        data,
        format: format.name,
        sequence: 0,
        timestamp: Utc::now(),
    })
}
