// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel formats, color packing, and row stride arithmetic.
//!
//! Every format-dependent decision lives here, so the bitmap layer only deals
//! in packed byte slices plus the helpers below.
//!
//! # Wire packing
//!
//! - [`PixelFormat::Rgb565`]: 2 bytes, a little-endian `u16` with red in the
//!   high 5 bits, green in the middle 6, blue in the low 5.
//! - [`PixelFormat::Rgb888`]: 3 bytes in R, G, B order.
//! - [`PixelFormat::Rgba32`]: 4 bytes in R, G, B, A order.
//!
//! Rows are padded so that each starts on a [`ROW_ALIGNMENT`] byte boundary.
//! Padding bytes are unspecified.

use core::fmt;

use crate::error::{Error, Result};

/// Byte alignment of bitmap rows required by the GPU service.
pub const ROW_ALIGNMENT: u32 = 16;

/// Rounds `n` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two.
#[inline]
#[must_use]
pub const fn align_up(n: u32, alignment: u32) -> u32 {
    debug_assert!(alignment.is_power_of_two(), "alignment must be a power of two");
    (n + alignment - 1) & !(alignment - 1)
}

/// Pixel layouts understood by the GPU service.
///
/// Only [`Rgb565`](Self::Rgb565), [`Rgb888`](Self::Rgb888), and
/// [`Rgba32`](Self::Rgba32) are supported by the compositor. The remaining
/// tags exist in the service vocabulary; every operation on them returns
/// [`Error::Unsupported`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 16-bit 5-6-5 RGB.
    Rgb565,
    /// 24-bit RGB.
    Rgb888,
    /// 32-bit RGBA.
    Rgba32,
    /// 16-bit 4-4-4-4 RGBA (reserved).
    Rgba16,
    /// Planar YUV 4:2:0 (reserved).
    Yuv420,
    /// 8-bit palette index (reserved).
    Palette8,
}

impl PixelFormat {
    /// Returns `true` for the formats the compositor can pack and unpack.
    #[inline]
    #[must_use]
    pub const fn is_supported(self) -> bool {
        matches!(self, Self::Rgb565 | Self::Rgb888 | Self::Rgba32)
    }

    /// Returns `true` if the format carries a per-pixel alpha channel.
    #[inline]
    #[must_use]
    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba32 | Self::Rgba16)
    }

    /// Bytes per pixel: 2, 3, or 4.
    pub fn bytes_per_pixel(self) -> Result<u32> {
        match self {
            Self::Rgb565 => Ok(2),
            Self::Rgb888 => Ok(3),
            Self::Rgba32 => Ok(4),
            Self::Rgba16 | Self::Yuv420 | Self::Palette8 => Err(Error::Unsupported(self)),
        }
    }

    /// Row stride in bytes for a row of `width` pixels:
    /// `align_up(width * bytes_per_pixel, ROW_ALIGNMENT)`.
    pub fn stride_for(self, width: u32) -> Result<u32> {
        let bpp = self.bytes_per_pixel()?;
        let bytes = width
            .checked_mul(bpp)
            .filter(|n| *n <= u32::MAX - (ROW_ALIGNMENT - 1))
            .ok_or(Error::BadParameter("row too wide"))?;
        Ok(align_up(bytes, ROW_ALIGNMENT))
    }

    /// Packs a generic color into this format.
    ///
    /// Channels are truncated to the format's precision; alpha is discarded
    /// for formats without an alpha channel.
    pub fn pack(self, c: Rgba16) -> Result<Color> {
        let mut bytes = [0_u8; 4];
        match self {
            Self::Rgb565 => {
                let word = ((c.r >> 11) << 11) | ((c.g >> 10) << 5) | (c.b >> 11);
                bytes[..2].copy_from_slice(&word.to_le_bytes());
            }
            Self::Rgb888 => {
                bytes[0] = high_byte(c.r);
                bytes[1] = high_byte(c.g);
                bytes[2] = high_byte(c.b);
            }
            Self::Rgba32 => {
                bytes = [
                    high_byte(c.r),
                    high_byte(c.g),
                    high_byte(c.b),
                    high_byte(c.a),
                ];
            }
            Self::Rgba16 | Self::Yuv420 | Self::Palette8 => return Err(Error::Unsupported(self)),
        }
        Ok(Color {
            format: self,
            bytes,
        })
    }

    /// Unpacks the first pixel of `bytes` into a generic color.
    ///
    /// Low bits are filled by replicating the high bits, so full-scale values
    /// map to `0xFFFF`. Formats without alpha yield `a = 0xFFFF`.
    pub fn unpack(self, bytes: &[u8]) -> Result<Rgba16> {
        let bpp = self.bytes_per_pixel()? as usize;
        let px = bytes
            .get(..bpp)
            .ok_or(Error::BadParameter("pixel slice too short"))?;
        Ok(match self {
            Self::Rgb565 => {
                let word = u16::from_le_bytes([px[0], px[1]]);
                let r5 = (word >> 11) & 0x1f;
                let g6 = (word >> 5) & 0x3f;
                let b5 = word & 0x1f;
                Rgba16 {
                    r: widen8((r5 << 3) | (r5 >> 2)),
                    g: widen8((g6 << 2) | (g6 >> 4)),
                    b: widen8((b5 << 3) | (b5 >> 2)),
                    a: 0xffff,
                }
            }
            Self::Rgb888 => Rgba16 {
                r: widen8(u16::from(px[0])),
                g: widen8(u16::from(px[1])),
                b: widen8(u16::from(px[2])),
                a: 0xffff,
            },
            _ => Rgba16 {
                r: widen8(u16::from(px[0])),
                g: widen8(u16::from(px[1])),
                b: widen8(u16::from(px[2])),
                a: widen8(u16::from(px[3])),
            },
        })
    }
}

#[inline]
fn high_byte(v: u16) -> u8 {
    v.to_be_bytes()[0]
}

/// Replicates an 8-bit value into 16 bits (`0xAB` becomes `0xABAB`).
#[inline]
const fn widen8(v: u16) -> u16 {
    (v << 8) | (v & 0xff)
}

/// A generic color with 16 bits per channel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgba16 {
    /// Red.
    pub r: u16,
    /// Green.
    pub g: u16,
    /// Blue.
    pub b: u16,
    /// Alpha (`0xFFFF` is opaque).
    pub a: u16,
}

impl Rgba16 {
    /// Opaque white.
    pub const WHITE: Self = Self::new(0xffff, 0xffff, 0xffff, 0xffff);
    /// Opaque black.
    pub const BLACK: Self = Self::new(0, 0, 0, 0xffff);
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    /// Creates a color from 16-bit channels.
    #[inline]
    #[must_use]
    pub const fn new(r: u16, g: u16, b: u16, a: u16) -> Self {
        Self { r, g, b, a }
    }

    /// Creates a color from 8-bit channels, replicating each into 16 bits.
    #[inline]
    #[must_use]
    pub const fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: widen8(r as u16),
            g: widen8(g as u16),
            b: widen8(b as u16),
            a: widen8(a as u16),
        }
    }

    /// Returns the high byte of each channel.
    #[inline]
    #[must_use]
    pub fn to_rgba8(self) -> [u8; 4] {
        [
            high_byte(self.r),
            high_byte(self.g),
            high_byte(self.b),
            high_byte(self.a),
        ]
    }
}

impl fmt::Debug for Rgba16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rgba16(#{:04x}{:04x}{:04x}{:04x})",
            self.r, self.g, self.b, self.a
        )
    }
}

/// A color packed into a specific [`PixelFormat`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    format: PixelFormat,
    bytes: [u8; 4],
}

impl Color {
    /// Wraps already-packed bytes.
    ///
    /// `bytes` must hold at least one pixel of `format`; extra bytes are
    /// ignored.
    pub fn from_bytes(format: PixelFormat, bytes: &[u8]) -> Result<Self> {
        let bpp = format.bytes_per_pixel()? as usize;
        let px = bytes
            .get(..bpp)
            .ok_or(Error::BadParameter("pixel slice too short"))?;
        let mut packed = [0_u8; 4];
        packed[..bpp].copy_from_slice(px);
        Ok(Self {
            format,
            bytes: packed,
        })
    }

    /// The transparent color of `format` (black for formats without alpha).
    pub fn transparent(format: PixelFormat) -> Result<Self> {
        format.pack(Rgba16::TRANSPARENT)
    }

    /// The format these bytes are packed in.
    #[inline]
    #[must_use]
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    /// The packed bytes, exactly `bytes_per_pixel` long.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        let bpp = match self.format {
            PixelFormat::Rgb565 => 2,
            PixelFormat::Rgb888 => 3,
            _ => 4,
        };
        &self.bytes[..bpp]
    }

    /// Unpacks into a generic color.
    pub fn to_rgba16(&self) -> Result<Rgba16> {
        self.format.unpack(&self.bytes)
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Color({:?} {:02x?})", self.format, self.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_per_pixel_of_supported_formats() {
        assert_eq!(PixelFormat::Rgb565.bytes_per_pixel(), Ok(2));
        assert_eq!(PixelFormat::Rgb888.bytes_per_pixel(), Ok(3));
        assert_eq!(PixelFormat::Rgba32.bytes_per_pixel(), Ok(4));
    }

    #[test]
    fn reserved_formats_are_unsupported() {
        for fmt in [
            PixelFormat::Rgba16,
            PixelFormat::Yuv420,
            PixelFormat::Palette8,
        ] {
            assert_eq!(fmt.bytes_per_pixel(), Err(Error::Unsupported(fmt)));
            assert_eq!(fmt.stride_for(4), Err(Error::Unsupported(fmt)));
            assert_eq!(fmt.pack(Rgba16::WHITE), Err(Error::Unsupported(fmt)));
            assert_eq!(fmt.unpack(&[0; 4]), Err(Error::Unsupported(fmt)));
        }
    }

    #[test]
    fn stride_is_sixteen_byte_aligned() {
        assert_eq!(PixelFormat::Rgba32.stride_for(1), Ok(16));
        assert_eq!(PixelFormat::Rgba32.stride_for(4), Ok(16));
        assert_eq!(PixelFormat::Rgba32.stride_for(5), Ok(32));
        assert_eq!(PixelFormat::Rgb888.stride_for(10), Ok(32));
        assert_eq!(PixelFormat::Rgb565.stride_for(8), Ok(16));
        assert_eq!(PixelFormat::Rgb565.stride_for(9), Ok(32));
    }

    #[test]
    fn stride_rejects_overflow() {
        assert!(PixelFormat::Rgba32.stride_for(u32::MAX).is_err());
    }

    #[test]
    fn align_up_rounds_to_multiple() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 16), 32);
    }

    #[test]
    fn rgb565_white_is_all_ones() {
        let c = PixelFormat::Rgb565.pack(Rgba16::WHITE).unwrap();
        assert_eq!(c.as_bytes(), &[0xff, 0xff]);
    }

    #[test]
    fn rgb565_channel_placement() {
        let red = PixelFormat::Rgb565
            .pack(Rgba16::from_rgba8(0xff, 0, 0, 0xff))
            .unwrap();
        assert_eq!(red.as_bytes(), &[0x00, 0xf8]);
        let green = PixelFormat::Rgb565
            .pack(Rgba16::from_rgba8(0, 0xff, 0, 0xff))
            .unwrap();
        assert_eq!(green.as_bytes(), &[0xe0, 0x07]);
        let blue = PixelFormat::Rgb565
            .pack(Rgba16::from_rgba8(0, 0, 0xff, 0xff))
            .unwrap();
        assert_eq!(blue.as_bytes(), &[0x1f, 0x00]);
    }

    #[test]
    fn byte_order_of_rgb888_and_rgba32() {
        let c = Rgba16::from_rgba8(1, 2, 3, 4);
        assert_eq!(PixelFormat::Rgb888.pack(c).unwrap().as_bytes(), &[1, 2, 3]);
        assert_eq!(
            PixelFormat::Rgba32.pack(c).unwrap().as_bytes(),
            &[1, 2, 3, 4]
        );
    }

    #[test]
    fn unpack_fills_alpha_for_opaque_formats() {
        let c = PixelFormat::Rgb888.unpack(&[0x12, 0x34, 0x56]).unwrap();
        assert_eq!(c, Rgba16::new(0x1212, 0x3434, 0x5656, 0xffff));
        let c = PixelFormat::Rgb565.unpack(&[0, 0]).unwrap();
        assert_eq!(c.a, 0xffff);
    }

    #[test]
    fn unpack_replicates_low_bits() {
        let c = PixelFormat::Rgb565.unpack(&[0xff, 0xff]).unwrap();
        assert_eq!(c, Rgba16::WHITE);
        let c = PixelFormat::Rgba32.unpack(&[0x80, 0, 0xff, 0x7f]).unwrap();
        assert_eq!(c, Rgba16::new(0x8080, 0, 0xffff, 0x7f7f));
    }

    #[test]
    fn pack_of_unpack_is_identity_for_byte_formats() {
        for px in [[0_u8, 0, 0, 0], [1, 2, 3, 4], [0xff, 0x80, 0x7f, 0x01]] {
            let back = PixelFormat::Rgba32
                .pack(PixelFormat::Rgba32.unpack(&px).unwrap())
                .unwrap();
            assert_eq!(back.as_bytes(), &px);
            let back = PixelFormat::Rgb888
                .pack(PixelFormat::Rgb888.unpack(&px[..3]).unwrap())
                .unwrap();
            assert_eq!(back.as_bytes(), &px[..3]);
        }
    }

    #[test]
    fn pack_of_unpack_is_identity_for_rgb565() {
        for word in [0_u16, 0x1234, 0xf800, 0x07e0, 0x001f, 0xffff, 0xa5a5] {
            let bytes = word.to_le_bytes();
            let back = PixelFormat::Rgb565
                .pack(PixelFormat::Rgb565.unpack(&bytes).unwrap())
                .unwrap();
            assert_eq!(back.as_bytes(), &bytes, "word {word:#06x}");
        }
    }

    #[test]
    fn unpack_rejects_short_slices() {
        assert!(PixelFormat::Rgba32.unpack(&[1, 2, 3]).is_err());
    }

    #[test]
    fn transparent_color_per_format() {
        let c = Color::transparent(PixelFormat::Rgba32).unwrap();
        assert_eq!(c.as_bytes(), &[0, 0, 0, 0]);
        let c = Color::transparent(PixelFormat::Rgb565).unwrap();
        assert_eq!(c.as_bytes(), &[0, 0]);
    }

    #[test]
    fn color_from_bytes_round_trips() {
        let c = Color::from_bytes(PixelFormat::Rgb888, &[9, 8, 7, 6]).unwrap();
        assert_eq!(c.as_bytes(), &[9, 8, 7]);
        assert_eq!(
            c.to_rgba16().unwrap(),
            Rgba16::new(0x0909, 0x0808, 0x0707, 0xffff)
        );
    }
}
