//! Fixed-resolution elevation grids covering one patch.

/// Failure to interpret a heightmap buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeightmapDecodeError {
    #[error("heightmap buffer is {actual} bytes, expected {expected}")]
    Length { expected: usize, actual: usize },

    #[error("heightmap buffer of {len} bytes is not a square grid of f32 values")]
    NotSquare { len: usize },

    #[error("heightmap resolution {0} is below the minimum of 2")]
    Resolution(usize),
}

/// A `resolution × resolution` grid of elevations in meters.
///
/// Values are stored row-major: `values[j * resolution + i]`, with `i`
/// running along the patch's `s` axis and `j` along `t`. Sample `(0, 0)` is
/// the patch's south-west corner and `(res-1, res-1)` its north-east corner.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchHeightmap {
    resolution: usize,
    values: Vec<f32>,
}

impl PatchHeightmap {
    /// Wrap a row-major value buffer.
    pub fn new(resolution: usize, values: Vec<f32>) -> Result<Self, HeightmapDecodeError> {
        if resolution < 2 {
            return Err(HeightmapDecodeError::Resolution(resolution));
        }
        let expected = resolution * resolution;
        if values.len() != expected {
            return Err(HeightmapDecodeError::Length {
                expected: expected * 4,
                actual: values.len() * 4,
            });
        }
        Ok(Self { resolution, values })
    }

    /// A flat sea-level heightmap. `resolution` is raised to at least 2.
    #[must_use]
    pub fn zeros(resolution: usize) -> Self {
        let resolution = resolution.max(2);
        Self {
            resolution,
            values: vec![0.0; resolution * resolution],
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Sample at grid index `(i, j)`, clamped to the grid.
    #[inline]
    pub fn get(&self, i: isize, j: isize) -> f32 {
        let max = self.resolution as isize - 1;
        let i = i.clamp(0, max) as usize;
        let j = j.clamp(0, max) as usize;
        self.values[j * self.resolution + i]
    }

    /// Max of the four samples at the corners of cell `(i, j)`.
    pub fn max_around(&self, i: isize, j: isize) -> f32 {
        self.get(i, j)
            .max(self.get(i + 1, j))
            .max(self.get(i, j + 1))
            .max(self.get(i + 1, j + 1))
    }

    /// Ground height at a fractional position `[0, 1]²` within the patch,
    /// taken as the max of the surrounding cell's corners.
    pub fn sample_fraction(&self, fraction: [f64; 2]) -> f32 {
        let cells = (self.resolution - 1) as f64;
        let i = (fraction[0].clamp(0.0, 1.0) * cells).floor() as isize;
        let j = (fraction[1].clamp(0.0, 1.0) * cells).floor() as isize;
        let last = self.resolution as isize - 2;
        self.max_around(i.min(last), j.min(last))
    }

    /// Row-major little-endian `f32` bytes, the wire and storage format.
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let words: Vec<u32> = self.values.iter().map(|v| v.to_bits().to_le()).collect();
        bytemuck::cast_slice(&words).to_vec()
    }

    /// Decode a buffer produced by [`to_le_bytes`](Self::to_le_bytes).
    pub fn from_le_bytes(resolution: usize, bytes: &[u8]) -> Result<Self, HeightmapDecodeError> {
        let expected = resolution * resolution * 4;
        if bytes.len() != expected {
            return Err(HeightmapDecodeError::Length {
                expected,
                actual: bytes.len(),
            });
        }
        // Input need not be 4-byte aligned.
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_bits(u32::from_le(bytemuck::pod_read_unaligned(c))))
            .collect();
        Self::new(resolution, values)
    }

    /// Decode a buffer whose resolution is implied by its length.
    pub fn from_le_bytes_square(bytes: &[u8]) -> Result<Self, HeightmapDecodeError> {
        let not_square = HeightmapDecodeError::NotSquare { len: bytes.len() };
        if bytes.len() % 4 != 0 {
            return Err(not_square);
        }
        let count = bytes.len() / 4;
        let resolution = (count as f64).sqrt().round() as usize;
        if resolution * resolution != count {
            return Err(not_square);
        }
        Self::from_le_bytes(resolution, bytes)
    }

    /// The grid as `resolution` rows of `resolution` values.
    #[must_use]
    pub fn rows(&self) -> Vec<Vec<f32>> {
        self.values
            .chunks(self.resolution)
            .map(<[f32]>::to_vec)
            .collect()
    }
}
