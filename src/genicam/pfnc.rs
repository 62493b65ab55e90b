//! Pixel Format Naming Convention (PFNC) table.
//!
//! Only the formats the decoder can produce frames for are listed, plus `YUV422_8` so that
//! it can be recognised and rejected by name.

use std::fmt;

/// Bit 31 of a PFNC code marks a vendor-specific format.
pub const CUSTOM_FORMAT_FLAG: u32 = 0x8000_0000;

/// Channel layout family of a pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFamily {
    /// Single channel intensity.
    Mono,
    /// Raw Bayer mosaic, delivered undebayered as one plane.
    Bayer,
    /// Packed red, green, blue.
    Rgb,
    /// Packed red, green, blue, alpha.
    Rgba,
    /// Packed blue, green, red.
    Bgr,
    /// Packed blue, green, red, alpha.
    Bgra,
    /// Luma/chroma subsampled.
    Yuv,
}

impl PixelFamily {
    /// Whether frames of this family decode to a single plane.
    pub fn is_planar(&self) -> bool {
        matches!(self, PixelFamily::Mono | PixelFamily::Bayer)
    }
}

impl fmt::Display for PixelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFamily::Mono => "mono",
            PixelFamily::Bayer => "bayer",
            PixelFamily::Rgb => "rgb",
            PixelFamily::Rgba => "rgba",
            PixelFamily::Bgr => "bgr",
            PixelFamily::Bgra => "bgra",
            PixelFamily::Yuv => "yuv",
        };
        f.write_str(name)
    }
}

/// One PFNC entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    /// PFNC name, e.g. `Mono12`.
    pub name: &'static str,
    /// 32-bit PFNC code.
    pub code: u32,
    /// Layout family.
    pub family: PixelFamily,
    /// Significant bits per sample.
    pub bits_per_channel: u32,
    /// Samples per pixel.
    pub channels: usize,
}

impl PixelFormat {
    /// Bytes needed to hold one sample.
    pub fn bytes_per_sample(&self) -> usize {
        if self.bits_per_channel > 8 {
            2
        } else {
            1
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

macro_rules! formats {
    ($($name:literal => $code:literal, $family:ident, $bits:literal, $channels:literal;)*) => {
        /// Every known format.
        pub const FORMATS: &[PixelFormat] = &[
            $(PixelFormat {
                name: $name,
                code: $code,
                family: PixelFamily::$family,
                bits_per_channel: $bits,
                channels: $channels,
            },)*
        ];
    };
}

formats! {
    "Mono8" => 0x0108_0001, Mono, 8, 1;
    "Mono10" => 0x0110_0003, Mono, 10, 1;
    "Mono12" => 0x0110_0005, Mono, 12, 1;
    "Mono14" => 0x0110_0025, Mono, 14, 1;
    "Mono16" => 0x0110_0007, Mono, 16, 1;

    "BayerGR8" => 0x0108_0008, Bayer, 8, 1;
    "BayerRG8" => 0x0108_0009, Bayer, 8, 1;
    "BayerGB8" => 0x0108_000A, Bayer, 8, 1;
    "BayerBG8" => 0x0108_000B, Bayer, 8, 1;
    "BayerGR10" => 0x0110_000C, Bayer, 10, 1;
    "BayerRG10" => 0x0110_000D, Bayer, 10, 1;
    "BayerGB10" => 0x0110_000E, Bayer, 10, 1;
    "BayerBG10" => 0x0110_000F, Bayer, 10, 1;
    "BayerGR12" => 0x0110_0010, Bayer, 12, 1;
    "BayerRG12" => 0x0110_0011, Bayer, 12, 1;
    "BayerGB12" => 0x0110_0012, Bayer, 12, 1;
    "BayerBG12" => 0x0110_0013, Bayer, 12, 1;
    "BayerGR16" => 0x0110_002E, Bayer, 16, 1;
    "BayerRG16" => 0x0110_002F, Bayer, 16, 1;
    "BayerGB16" => 0x0110_0030, Bayer, 16, 1;
    "BayerBG16" => 0x0110_0031, Bayer, 16, 1;

    "RGB8" => 0x0218_0014, Rgb, 8, 3;
    "BGR8" => 0x0218_0015, Bgr, 8, 3;
    "RGB10" => 0x0230_0018, Rgb, 10, 3;
    "BGR10" => 0x0230_0019, Bgr, 10, 3;
    "RGB12" => 0x0230_001A, Rgb, 12, 3;
    "BGR12" => 0x0230_001B, Bgr, 12, 3;
    "RGB16" => 0x0230_0033, Rgb, 16, 3;
    "BGR16" => 0x0230_004B, Bgr, 16, 3;

    "RGBa8" => 0x0220_0016, Rgba, 8, 4;
    "BGRa8" => 0x0220_0017, Bgra, 8, 4;
    "RGBa10" => 0x0240_005F, Rgba, 10, 4;
    "BGRa10" => 0x0240_004C, Bgra, 10, 4;
    "RGBa12" => 0x0240_0061, Rgba, 12, 4;
    "BGRa12" => 0x0240_004E, Bgra, 12, 4;
    "RGBa16" => 0x0240_0064, Rgba, 16, 4;
    "BGRa16" => 0x0240_0051, Bgra, 16, 4;

    "YUV422_8" => 0x0210_0032, Yuv, 8, 2;
}

/// Whether `code` is a vendor-specific format.
pub fn is_custom(code: u32) -> bool {
    code & CUSTOM_FORMAT_FLAG != 0
}

/// Look a format up by its PFNC code. Custom codes never match.
pub fn lookup(code: u32) -> Option<&'static PixelFormat> {
    if is_custom(code) {
        return None;
    }
    FORMATS.iter().find(|format| format.code == code)
}

/// Look a format up by its PFNC name, e.g. `"BayerRG12"`.
pub fn by_name(name: &str) -> Option<&'static PixelFormat> {
    FORMATS.iter().find(|format| format.name == name)
}

/// Human readable name for any code, including unknown and custom ones.
pub fn describe(code: u32) -> String {
    match lookup(code) {
        Some(format) => format.name.to_string(),
        None if is_custom(code) => "custom".to_string(),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_and_names_are_unique() {
        let codes: HashSet<_> = FORMATS.iter().map(|f| f.code).collect();
        let names: HashSet<_> = FORMATS.iter().map(|f| f.name).collect();
        assert_eq!(codes.len(), FORMATS.len());
        assert_eq!(names.len(), FORMATS.len());
    }

    #[test]
    fn test_bits_per_pixel_matches_code() {
        // Bits 16..24 of a PFNC code hold the effective bits per pixel.
        for format in FORMATS {
            let bpp = (format.code >> 16) & 0xFF;
            let unpacked = format.bytes_per_sample() as u32 * 8 * format.channels as u32;
            assert_eq!(bpp, unpacked, "{}", format.name);
        }
    }

    #[test]
    fn test_lookup() {
        let mono16 = lookup(0x0110_0007).unwrap();
        assert_eq!(mono16.name, "Mono16");
        assert_eq!(mono16.family, PixelFamily::Mono);
        assert_eq!(mono16.bits_per_channel, 16);

        assert_eq!(by_name("BGRa8").unwrap().channels, 4);
        assert_eq!(by_name("YUV422_8").unwrap().family, PixelFamily::Yuv);
        assert!(lookup(0x0123_4567).is_none());
    }

    #[test]
    fn test_custom_codes() {
        assert!(is_custom(0x8108_0001));
        assert!(!is_custom(0x0108_0001));
        assert!(lookup(0x8108_0001).is_none());
        assert_eq!(describe(0x8108_0001), "custom");
        assert_eq!(describe(0x0000_0042), "unknown");
        assert_eq!(describe(0x0218_0015), "BGR8");
    }
}
