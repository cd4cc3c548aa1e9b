//! # Height-Field Sources
//!
//! Initial terrain is seeded from a 2D sampler returning a normalized height
//! in `[0, 1]`. The level multiplies it by `max_height` and fills each column
//! from the ground up.
//!
//! ## Sources
//!
//! | Source | Use |
//! |--------|-----|
//! | closure `Fn(f32, f32) -> f32` | tests, ad-hoc shapes |
//! | [`FlatHeightField`] | constant ground level |
//! | [`HeightMap`] | raster (e.g. decoded from an image mask) |
//! | [`SimplexHeightField`] | seeded fractal noise, fully deterministic |

use crate::error::{WorldError, WorldResult};

/// A 2D sampler of normalized terrain height.
///
/// Values outside `[0, 1]` are clamped by the consumer.
pub trait HeightField: Sync {
    /// Samples the height at plan coordinates `(x, y)`.
    fn sample(&self, x: f32, y: f32) -> f32;
}

impl<F> HeightField for F
where
    F: Fn(f32, f32) -> f32 + Sync,
{
    #[inline]
    fn sample(&self, x: f32, y: f32) -> f32 {
        self(x, y)
    }
}

/// Constant height everywhere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlatHeightField(pub f32);

impl HeightField for FlatHeightField {
    #[inline]
    fn sample(&self, _x: f32, _y: f32) -> f32 {
        self.0
    }
}

/// A sampled raster of heights with clamped edge lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightMap {
    width: u32,
    depth: u32,
    /// Row-major, `depth` rows of `width` samples.
    values: Vec<f32>,
}

impl HeightMap {
    /// Creates a height map from row-major samples.
    ///
    /// # Errors
    ///
    /// Returns an error when either side is zero or the sample count does not
    /// equal `width * depth`.
    pub fn new(width: u32, depth: u32, values: Vec<f32>) -> WorldResult<Self> {
        if width == 0 || depth == 0 {
            return Err(WorldError::InvalidDimensions {
                block_size: 1,
                max_height: 1,
                width,
                depth,
            });
        }
        let expected = width as usize * depth as usize;
        if values.len() != expected {
            return Err(WorldError::VoxelLength {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            width,
            depth,
            values,
        })
    }

    /// Builds a height map from a solid/open mask: solid cells sample as 1.
    ///
    /// # Errors
    ///
    /// Same conditions as [`HeightMap::new`].
    pub fn from_mask(width: u32, depth: u32, mask: &[bool]) -> WorldResult<Self> {
        let values = mask.iter().map(|&solid| if solid { 1.0 } else { 0.0 }).collect();
        Self::new(width, depth, values)
    }

    /// Raster width.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Raster depth.
    #[inline]
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }
}

impl HeightField for HeightMap {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn sample(&self, x: f32, y: f32) -> f32 {
        let clamp = |v: f32, len: u32| -> usize {
            if v.is_nan() || v < 0.0 {
                0
            } else {
                (v.floor() as usize).min(len as usize - 1)
            }
        };
        let col = clamp(x, self.width);
        let row = clamp(y, self.depth);
        self.values[row * self.width as usize + col]
    }
}

/// Seed for deterministic terrain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TerrainSeed(u64);

impl TerrainSeed {
    /// Creates a seed.
    #[inline]
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Raw seed value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Derives an independent sub-seed for another layer of generation.
    #[inline]
    #[must_use]
    pub const fn derive(self, layer: u64) -> Self {
        let mut hash = self.0 ^ layer;
        hash = hash.wrapping_mul(0x517c_c1b7_2722_0a95);
        hash ^= hash >> 32;
        Self(hash)
    }
}

impl Default for TerrainSeed {
    fn default() -> Self {
        Self(0x5EED_0F_57A7A)
    }
}

/// Unit gradients used by the 2D simplex lattice.
const GRADIENTS: [[f64; 2]; 8] = [
    [1.0, 0.0],
    [-1.0, 0.0],
    [0.0, 1.0],
    [0.0, -1.0],
    [0.707_106_781, 0.707_106_781],
    [-0.707_106_781, 0.707_106_781],
    [0.707_106_781, -0.707_106_781],
    [-0.707_106_781, -0.707_106_781],
];

/// Seeded 2D simplex lattice.
#[derive(Clone)]
struct SimplexLattice {
    perm: [u8; 512],
}

impl SimplexLattice {
    /// (sqrt(3) - 1) / 2
    const SKEW: f64 = 0.366_025_403_784_439;
    /// (3 - sqrt(3)) / 6
    const UNSKEW: f64 = 0.211_324_865_405_187;

    #[allow(clippy::cast_possible_truncation)]
    fn new(seed: TerrainSeed) -> Self {
        let mut table = [0u8; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = i as u8;
        }

        // xorshift64 drives a Fisher-Yates shuffle; zero state would stall it.
        let mut state = seed.value() | 1;
        for i in (1..256usize).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            table.swap(i, (state % (i as u64 + 1)) as usize);
        }

        let mut perm = [0u8; 512];
        perm[..256].copy_from_slice(&table);
        perm[256..].copy_from_slice(&table);
        Self { perm }
    }

    #[inline]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn hash(&self, i: i64, j: i64) -> usize {
        let i = (i & 255) as usize;
        let j = (j & 255) as usize;
        usize::from(self.perm[i + usize::from(self.perm[j])])
    }

    #[inline]
    fn corner(&self, dx: f64, dy: f64, hash: usize) -> f64 {
        let t = 0.5 - dx * dx - dy * dy;
        if t <= 0.0 {
            return 0.0;
        }
        let g = GRADIENTS[hash & 7];
        let t2 = t * t;
        t2 * t2 * (g[0] * dx + g[1] * dy)
    }

    /// Samples noise at `(x, y)`, approximately in `[-1, 1]`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn sample(&self, x: f64, y: f64) -> f64 {
        let s = (x + y) * Self::SKEW;
        let i = (x + s).floor() as i64;
        let j = (y + s).floor() as i64;

        let t = (i + j) as f64 * Self::UNSKEW;
        let x0 = x - (i as f64 - t);
        let y0 = y - (j as f64 - t);

        let (i1, j1) = if x0 > y0 { (1, 0) } else { (0, 1) };

        let x1 = x0 - f64::from(i1) + Self::UNSKEW;
        let y1 = y0 - f64::from(j1) + Self::UNSKEW;
        let x2 = x0 - 1.0 + 2.0 * Self::UNSKEW;
        let y2 = y0 - 1.0 + 2.0 * Self::UNSKEW;

        let n0 = self.corner(x0, y0, self.hash(i, j));
        let n1 = self.corner(x1, y1, self.hash(i + i64::from(i1), j + i64::from(j1)));
        let n2 = self.corner(x2, y2, self.hash(i + 1, j + 1));

        70.0 * (n0 + n1 + n2)
    }
}

/// Seeded fractal simplex terrain mapped into `[0, 1]`.
///
/// # Example
///
/// ```rust
/// use strata_world::{HeightField, SimplexHeightField, TerrainSeed};
///
/// let a = SimplexHeightField::new(TerrainSeed::new(7), 4, 0.02);
/// let b = SimplexHeightField::new(TerrainSeed::new(7), 4, 0.02);
/// assert_eq!(a.sample(12.0, 30.0), b.sample(12.0, 30.0));
/// ```
#[derive(Clone)]
pub struct SimplexHeightField {
    lattice: SimplexLattice,
    octaves: u32,
    frequency: f64,
    persistence: f64,
    lacunarity: f64,
}

impl SimplexHeightField {
    /// Creates a field with `octaves` layers starting at `frequency`.
    ///
    /// Zero octaves is treated as one.
    #[must_use]
    pub fn new(seed: TerrainSeed, octaves: u32, frequency: f64) -> Self {
        Self {
            lattice: SimplexLattice::new(seed),
            octaves: octaves.max(1),
            frequency,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }

    /// Overrides amplitude decay and frequency growth per octave.
    #[must_use]
    pub const fn with_shape(mut self, persistence: f64, lacunarity: f64) -> Self {
        self.persistence = persistence;
        self.lacunarity = lacunarity;
        self
    }

    /// Number of octaves.
    #[inline]
    #[must_use]
    pub const fn octaves(&self) -> u32 {
        self.octaves
    }

    fn fractal(&self, x: f64, y: f64) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = self.frequency;
        let mut norm = 0.0;

        for _ in 0..self.octaves {
            total += self.lattice.sample(x * frequency, y * frequency) * amplitude;
            norm += amplitude;
            amplitude *= self.persistence;
            frequency *= self.lacunarity;
        }

        if norm > 0.0 {
            total / norm
        } else {
            0.0
        }
    }
}

impl std::fmt::Debug for SimplexHeightField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimplexHeightField")
            .field("octaves", &self.octaves)
            .field("frequency", &self.frequency)
            .field("persistence", &self.persistence)
            .field("lacunarity", &self.lacunarity)
            .finish_non_exhaustive()
    }
}

impl HeightField for SimplexHeightField {
    #[allow(clippy::cast_possible_truncation)]
    fn sample(&self, x: f32, y: f32) -> f32 {
        let value = self.fractal(f64::from(x), f64::from(y));
        ((value + 1.0) * 0.5).clamp(0.0, 1.0) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_and_flat() {
        let ramp = |x: f32, _y: f32| x / 10.0;
        assert!((ramp.sample(5.0, 0.0) - 0.5).abs() < f32::EPSILON);
        assert!((FlatHeightField(0.3).sample(99.0, -4.0) - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_height_map_clamps_edges() {
        let map = HeightMap::new(2, 2, vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        assert!((map.sample(0.0, 0.0) - 0.1).abs() < f32::EPSILON);
        assert!((map.sample(1.5, 0.2) - 0.2).abs() < f32::EPSILON);
        assert!((map.sample(0.0, 1.0) - 0.3).abs() < f32::EPSILON);
        assert!((map.sample(50.0, 50.0) - 0.4).abs() < f32::EPSILON);
        assert!((map.sample(-3.0, f32::NAN) - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_height_map_rejects_bad_shape() {
        assert!(HeightMap::new(0, 2, Vec::new()).is_err());
        assert_eq!(
            HeightMap::new(2, 2, vec![0.0; 3]),
            Err(WorldError::VoxelLength { expected: 4, actual: 3 })
        );
    }

    #[test]
    fn test_height_map_from_mask() {
        let map = HeightMap::from_mask(3, 1, &[true, false, true]).unwrap();
        assert!((map.sample(0.0, 0.0) - 1.0).abs() < f32::EPSILON);
        assert!(map.sample(1.0, 0.0).abs() < f32::EPSILON);
        assert_eq!(map.width(), 3);
        assert_eq!(map.depth(), 1);
    }

    #[test]
    fn test_simplex_is_deterministic() {
        let a = SimplexHeightField::new(TerrainSeed::new(12345), 4, 0.05);
        let b = SimplexHeightField::new(TerrainSeed::new(12345), 4, 0.05);
        for i in 0..200 {
            let x = i as f32 * 0.7;
            let y = i as f32 * 1.3;
            assert_eq!(a.sample(x, y).to_bits(), b.sample(x, y).to_bits());
        }
    }

    #[test]
    fn test_simplex_range() {
        let field = SimplexHeightField::new(TerrainSeed::new(42), 6, 0.03);
        for i in 0..5000 {
            let x = (i as f32 * 0.37) - 800.0;
            let y = (i as f32 * 0.53) - 600.0;
            let h = field.sample(x, y);
            assert!((0.0..=1.0).contains(&h), "height {h} out of range at ({x}, {y})");
        }
    }

    #[test]
    fn test_simplex_seeds_differ() {
        let a = SimplexHeightField::new(TerrainSeed::new(1), 3, 0.05);
        let b = SimplexHeightField::new(TerrainSeed::new(2), 3, 0.05);
        let differs = (0..64).any(|i| {
            let p = i as f32 * 3.1;
            a.sample(p, p * 0.5) != b.sample(p, p * 0.5)
        });
        assert!(differs, "different seeds should give different terrain");
    }

    #[test]
    fn test_seed_derivation() {
        let base = TerrainSeed::new(42);
        assert_eq!(base.derive(1), base.derive(1));
        assert_ne!(base.derive(1), base.derive(2));
        assert_ne!(base.derive(1), base);
    }
}
