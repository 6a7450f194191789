//! PostGIS raster WKB codec.
//!
//! Layout (little endian when the first byte is 1):
//!
//! ```text
//! endian u8 | version u16 | nbands u16 | scale_x f64 | scale_y f64
//! | ip_x f64 | ip_y f64 | skew_x f64 | skew_y f64 | srid i32 | width u16 | height u16
//! band: flags u8 | nodata (pixtype) | pixels (pixtype * width * height)
//! ```
//!
//! Only single-band, in-db rasters without skew are supported.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use agro_common::grid::DEFAULT_NODATA;
use agro_common::{GeoTransform, GridTile};

use crate::error::{Result, StoreError};

pub const SRID_WGS84: i32 = 4326;

const FLAG_OFFLINE: u8 = 0x80;
const FLAG_HAS_NODATA: u8 = 0x40;
const PIXTYPE_MASK: u8 = 0x0F;

/// Pixel types of the WKB band header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelType {
    Bool1,
    U2,
    U4,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl PixelType {
    fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0 => PixelType::Bool1,
            1 => PixelType::U2,
            2 => PixelType::U4,
            3 => PixelType::I8,
            4 => PixelType::U8,
            5 => PixelType::I16,
            6 => PixelType::U16,
            7 => PixelType::I32,
            8 => PixelType::U32,
            10 => PixelType::F32,
            11 => PixelType::F64,
            other => return Err(StoreError::codec(format!("unknown pixel type {}", other))),
        })
    }

    fn size(&self) -> usize {
        match self {
            PixelType::Bool1 | PixelType::U2 | PixelType::U4 | PixelType::I8 | PixelType::U8 => 1,
            PixelType::I16 | PixelType::U16 => 2,
            PixelType::I32 | PixelType::U32 | PixelType::F32 => 4,
            PixelType::F64 => 8,
        }
    }
}

/// Encode a tile as a single 64-bit float band, little endian.
pub fn encode(tile: &GridTile, srid: i32) -> Bytes {
    let mut buf = BytesMut::with_capacity(61 + 9 + tile.data.len() * 8);
    buf.put_u8(1);
    buf.put_u16_le(0);
    buf.put_u16_le(1);
    buf.put_f64_le(tile.transform.pixel_width);
    buf.put_f64_le(tile.transform.pixel_height);
    buf.put_f64_le(tile.transform.origin_x);
    buf.put_f64_le(tile.transform.origin_y);
    buf.put_f64_le(0.0);
    buf.put_f64_le(0.0);
    buf.put_i32_le(srid);
    buf.put_u16_le(tile.width as u16);
    buf.put_u16_le(tile.height as u16);

    buf.put_u8(FLAG_HAS_NODATA | 11);
    buf.put_f64_le(tile.nodata);
    for v in &tile.data {
        buf.put_f64_le(if v.is_nan() { tile.nodata } else { *v });
    }
    buf.freeze()
}

struct Reader<'a> {
    buf: &'a [u8],
    little: bool,
}

impl<'a> Reader<'a> {
    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(StoreError::codec(format!(
                "truncated raster: need {} bytes, {} left",
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(if self.little { self.buf.get_u16_le() } else { self.buf.get_u16() })
    }

    fn i32(&mut self) -> Result<i32> {
        self.need(4)?;
        Ok(if self.little { self.buf.get_i32_le() } else { self.buf.get_i32() })
    }

    fn f64(&mut self) -> Result<f64> {
        self.need(8)?;
        Ok(if self.little { self.buf.get_f64_le() } else { self.buf.get_f64() })
    }

    fn pixel(&mut self, pt: PixelType) -> Result<f64> {
        self.need(pt.size())?;
        let l = self.little;
        let b = &mut self.buf;
        Ok(match pt {
            PixelType::Bool1 | PixelType::U2 | PixelType::U4 | PixelType::U8 => b.get_u8() as f64,
            PixelType::I8 => b.get_i8() as f64,
            PixelType::I16 => (if l { b.get_i16_le() } else { b.get_i16() }) as f64,
            PixelType::U16 => (if l { b.get_u16_le() } else { b.get_u16() }) as f64,
            PixelType::I32 => (if l { b.get_i32_le() } else { b.get_i32() }) as f64,
            PixelType::U32 => (if l { b.get_u32_le() } else { b.get_u32() }) as f64,
            PixelType::F32 => (if l { b.get_f32_le() } else { b.get_f32() }) as f64,
            PixelType::F64 => {
                if l {
                    b.get_f64_le()
                } else {
                    b.get_f64()
                }
            }
        })
    }
}

/// Decode the first band of a raster WKB blob.
pub fn decode(data: &[u8]) -> Result<GridTile> {
    let endian = *data
        .first()
        .ok_or_else(|| StoreError::codec("empty raster"))?;
    let mut r = Reader {
        buf: &data[1..],
        little: match endian {
            0 => false,
            1 => true,
            other => return Err(StoreError::codec(format!("bad endian flag {}", other))),
        },
    };

    let version = r.u16()?;
    if version != 0 {
        return Err(StoreError::codec(format!("unsupported version {}", version)));
    }
    let bands = r.u16()?;
    let scale_x = r.f64()?;
    let scale_y = r.f64()?;
    let ip_x = r.f64()?;
    let ip_y = r.f64()?;
    let skew_x = r.f64()?;
    let skew_y = r.f64()?;
    let _srid = r.i32()?;
    let width = r.u16()? as usize;
    let height = r.u16()? as usize;

    if bands == 0 {
        return Err(StoreError::codec("raster has no bands"));
    }
    if skew_x != 0.0 || skew_y != 0.0 {
        return Err(StoreError::codec("skewed rasters are not supported"));
    }

    let flags = r.u8()?;
    if flags & FLAG_OFFLINE != 0 {
        return Err(StoreError::codec("out-db bands are not supported"));
    }
    let pixtype = PixelType::from_code(flags & PIXTYPE_MASK)?;
    let band_nodata = r.pixel(pixtype)?;
    let nodata = if flags & FLAG_HAS_NODATA != 0 {
        band_nodata
    } else {
        DEFAULT_NODATA
    };

    let mut values = Vec::with_capacity(width * height);
    for _ in 0..width * height {
        values.push(r.pixel(pixtype)?);
    }

    Ok(GridTile::new(
        width,
        height,
        GeoTransform::new(ip_x, ip_y, scale_x, scale_y),
        nodata,
        values,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_keeps_placement_and_nodata() {
        let tile = GridTile::new(
            3,
            2,
            GeoTransform::new(33.5, 4.25, 0.25, -0.25),
            -9999.0,
            vec![1.5, -9999.0, 3.0, 4.0, 5.0, 6.25],
        )
        .unwrap();
        let bytes = encode(&tile, SRID_WGS84);
        assert_eq!(bytes.len(), 61 + 9 + 6 * 8);
        assert_eq!(decode(&bytes).unwrap(), tile);
    }

    #[test]
    fn test_decode_big_endian_float32() {
        let mut buf = BytesMut::new();
        buf.put_u8(0);
        buf.put_u16(0);
        buf.put_u16(1);
        for v in [1.0, -1.0, 10.0, 20.0, 0.0, 0.0] {
            buf.put_f64(v);
        }
        buf.put_i32(4326);
        buf.put_u16(2);
        buf.put_u16(1);
        buf.put_u8(FLAG_HAS_NODATA | 10);
        buf.put_f32(-1.0);
        buf.put_f32(2.5);
        buf.put_f32(-1.0);

        let tile = decode(&buf).unwrap();
        assert_eq!(tile.width, 2);
        assert_eq!(tile.transform, GeoTransform::new(10.0, 20.0, 1.0, -1.0));
        assert_eq!(tile.get(0, 0), Some(2.5));
        assert_eq!(tile.get(1, 0), None);
    }

    #[test]
    fn test_truncated_input() {
        let tile = GridTile::filled(2, 2, GeoTransform::new(0.0, 0.0, 1.0, -1.0), 1.0);
        let bytes = encode(&tile, SRID_WGS84);
        assert!(matches!(decode(&bytes[..bytes.len() - 3]), Err(StoreError::Codec(_))));
    }
}
