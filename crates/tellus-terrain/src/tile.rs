//! Slippy-map tile coordinates and terrarium-encoded elevation tiles.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};
use tellus_cubesphere::LonLat;

/// Width and height of a standard source tile.
pub const TILE_SIZE: u32 = 256;

/// A web-mercator tile address.
///
/// `x` is wrapped into `[0, 2^zoom)`. `y` is not, so latitudes beyond the
/// mercator limit give out-of-range rows that resolve to the empty tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i64,
    pub y: i64,
    pub zoom: u8,
}

/// A tile plus a fractional position inside it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileFraction {
    pub tile: TileCoord,
    /// Position inside the tile, `[0, 1)` on each axis, `y` growing south.
    pub offset: [f64; 2],
}

impl TileCoord {
    pub fn new(x: i64, y: i64, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    /// Whether the tile exists at its zoom level.
    pub fn is_in_range(&self) -> bool {
        let n = 1i64 << self.zoom.min(62);
        (0..n).contains(&self.x) && (0..n).contains(&self.y)
    }

    /// Storage key, `"x,y,zoom"`.
    pub fn key(&self) -> String {
        format!("{},{},{}", self.x, self.y, self.zoom)
    }

    /// The tile containing a longitude/latitude and the position inside it.
    pub fn fraction_at(lon_lat: LonLat, zoom: u8) -> TileFraction {
        let z2 = (1u64 << zoom.min(62)) as f64;
        let sin = lon_lat.lat.to_radians().sin();

        let mut x = z2 * (lon_lat.lon / 360.0 + 0.5);
        x %= z2;
        if x < 0.0 {
            x += z2;
        }
        let y = z2 * (0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI);

        let (ty, oy) = if y.is_finite() {
            (y.floor(), y - y.floor())
        } else if y < 0.0 || y.is_nan() {
            (-1.0, 0.0)
        } else {
            (z2, 0.0)
        };
        let tx = x.floor();

        TileFraction {
            tile: TileCoord::new(tx as i64, ty as i64, zoom),
            offset: [x - tx, oy],
        }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Decoded 8-bit raster tile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightmapTile {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

impl HeightmapTile {
    /// The all-zero stand-in for missing tiles.
    pub fn empty() -> Self {
        Self {
            width: TILE_SIZE,
            height: TILE_SIZE,
            channels: 3,
            data: vec![0; (TILE_SIZE * TILE_SIZE * 3) as usize],
        }
    }

    /// A tile where every pixel has the same RGB value.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self {
            width,
            height,
            channels: 3,
            data,
        }
    }

    /// Decode an encoded image (PNG or JPEG) into RGB bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let rgb = image::load_from_memory(bytes)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(Self {
            width,
            height,
            channels: 3,
            data: rgb.into_raw(),
        })
    }

    /// Whether the buffer length agrees with the shape metadata.
    pub fn is_consistent(&self) -> bool {
        self.channels >= 3
            && self.data.len() == self.width as usize * self.height as usize * self.channels as usize
    }

    /// Elevation of the pixel under a fractional tile offset, or `None` if
    /// the tile's buffer is too short to hold it.
    pub fn elevation_at(&self, offset: [f64; 2]) -> Option<f32> {
        if self.width == 0 || self.height == 0 || self.channels < 3 {
            return None;
        }
        let px = ((offset[0] * self.width as f64).floor() as u32).min(self.width - 1);
        let py = ((offset[1] * self.height as f64).floor() as u32).min(self.height - 1);
        let idx = (py as usize * self.width as usize + px as usize) * self.channels as usize;
        let rgb = self.data.get(idx..idx + 3)?;
        Some(terrarium_elevation(rgb[0], rgb[1], rgb[2]))
    }
}

/// Terrarium encoding: `(r * 256 + g + b / 256) - 32768` meters, clamped
/// at sea level.
#[inline]
pub fn terrarium_elevation(r: u8, g: u8, b: u8) -> f32 {
    let v = f32::from(r) * 256.0 + f32::from(g) + f32::from(b) / 256.0 - 32768.0;
    v.max(0.0)
}
