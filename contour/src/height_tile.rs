//! A lazy, composable 2-D height field.
//!
//! Every operation below returns a new [`HeightTile`]; none mutate. Most
//! variants are O(1) to construct — `sample` cost grows with composition
//! depth until [`HeightTile::materialize`] snapshots a region into a dense
//! array and resets that cost to O(1). See §4.2 for the full contract.

use std::sync::Arc;

use dem::DemTile;

#[derive(Debug, thiserror::Error)]
pub enum HeightTileError {
	#[error("combine_neighbors requires a center tile")]
	MissingCenter,
	#[error("split requires subz >= 0 and subx, suby < 2^subz")]
	InvalidSplit,
}

#[inline]
fn nan_aware_lerp(a: f32, b: f32, t: f64) -> f32 {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => f32::NAN,
		(true, false) => b,
		(false, true) => a,
		(false, false) => a + (b - a) * t as f32,
	}
}

#[derive(Clone)]
enum Inner {
	FromRaw(Arc<DemTile>),
	Combined {
		width: i64,
		height: i64,
		neighbors: Arc<[Option<HeightTile>; 9]>,
	},
	Split {
		source: Box<HeightTile>,
		width: i64,
		height: i64,
		offset_x: i64,
		offset_y: i64,
	},
	Subsampled {
		source: Box<HeightTile>,
		width: i64,
		height: i64,
		factor: i64,
	},
	Averaged {
		source: Box<HeightTile>,
		width: i64,
		height: i64,
		radius: i64,
	},
	Scaled {
		source: Box<HeightTile>,
		width: i64,
		height: i64,
		multiplier: f64,
	},
	Materialized {
		width: i64,
		height: i64,
		buffer: i64,
		data: Arc<[f32]>,
	},
}

/// A virtual 2-D grid of elevations. See module docs.
#[derive(Clone)]
pub struct HeightTile(Inner);

impl HeightTile {
	/// Wrap a decoded raster. Validity filtering (NaN/out-of-band) is
	/// `DemTile::elevation`'s job.
	pub fn from_raw(dem: DemTile) -> Self { Self(Inner::FromRaw(Arc::new(dem))) }

	/// Build a dense tile directly from samples, bypassing DEM validity
	/// filtering. Useful for synthetic fields (tests, the tracer's own
	/// unit tests) that aren't derived from a raster.
	pub fn from_samples(width: usize, height: usize, data: Vec<f32>) -> Self {
		assert_eq!(data.len(), width * height);
		Self(Inner::Materialized {
			width: width as i64,
			height: height as i64,
			buffer: 0,
			data: data.into(),
		})
	}

	pub fn width(&self) -> i64 {
		match &self.0 {
			Inner::FromRaw(dem) => dem.width as i64,
			Inner::Combined { width, .. }
			| Inner::Split { width, .. }
			| Inner::Subsampled { width, .. }
			| Inner::Averaged { width, .. }
			| Inner::Scaled { width, .. }
			| Inner::Materialized { width, .. } => *width,
		}
	}

	pub fn height(&self) -> i64 {
		match &self.0 {
			Inner::FromRaw(dem) => dem.height as i64,
			Inner::Combined { height, .. }
			| Inner::Split { height, .. }
			| Inner::Subsampled { height, .. }
			| Inner::Averaged { height, .. }
			| Inner::Scaled { height, .. }
			| Inner::Materialized { height, .. } => *height,
		}
	}

	/// Sample the field at `(x, y)`. `NaN` means invalid or out of the
	/// tile's defined domain.
	pub fn sample(&self, x: i64, y: i64) -> f32 {
		match &self.0 {
			Inner::FromRaw(dem) => {
				if x < 0 || y < 0 || x as usize >= dem.width || y as usize >= dem.height {
					f32::NAN
				} else {
					dem.elevation(x as usize, y as usize)
				}
			},
			Inner::Combined { width, height, neighbors } => Self::sample_combined(*width, *height, neighbors, x, y),
			Inner::Split { source, offset_x, offset_y, .. } => source.sample(x + offset_x, y + offset_y),
			Inner::Subsampled { source, factor, .. } => Self::sample_subsampled(source, *factor, x, y),
			Inner::Averaged { source, radius, .. } => Self::sample_averaged(source, *radius, x, y),
			Inner::Scaled { source, multiplier, .. } => {
				let v = source.sample(x, y);
				if v.is_nan() {
					v
				} else {
					v * *multiplier as f32
				}
			},
			Inner::Materialized { width, height, buffer, data } => {
				let (w, h, b) = (*width, *height, *buffer);
				if x < -b || x >= w + b || y < -b || y >= h + b {
					f32::NAN
				} else {
					let row_w = w + 2 * b;
					data[((y + b) * row_w + (x + b)) as usize]
				}
			},
		}
	}

	fn sample_combined(width: i64, height: i64, neighbors: &[Option<HeightTile>; 9], x: i64, y: i64) -> f32 {
		if x < -width || x >= 2 * width || y < -height || y >= 2 * height {
			return f32::NAN;
		}

		let (rx, local_x) = if x < 0 {
			(-1, x + width)
		} else if x >= width {
			(1, x - width)
		} else {
			(0, x)
		};
		let (ry, local_y) = if y < 0 {
			(-1, y + height)
		} else if y >= height {
			(1, y - height)
		} else {
			(0, y)
		};

		let index = ((ry + 1) * 3 + (rx + 1)) as usize;
		match &neighbors[index] {
			Some(tile) => tile.sample(local_x, local_y),
			None => f32::NAN,
		}
	}

	fn sample_subsampled(source: &HeightTile, factor: i64, x: i64, y: i64) -> f32 {
		let centering = 0.5 - 1.0 / (2.0 * factor as f64);
		let u = x as f64 / factor as f64 - centering;
		let v = y as f64 / factor as f64 - centering;

		let u0 = u.floor();
		let v0 = v.floor();
		let fu = u - u0;
		let fv = v - v0;
		let (u0, v0) = (u0 as i64, v0 as i64);

		let tl = source.sample(u0, v0);
		let tr = source.sample(u0 + 1, v0);
		let bl = source.sample(u0, v0 + 1);
		let br = source.sample(u0 + 1, v0 + 1);

		let top = nan_aware_lerp(tl, tr, fu);
		let bottom = nan_aware_lerp(bl, br, fu);
		nan_aware_lerp(top, bottom, fv)
	}

	fn sample_averaged(source: &HeightTile, radius: i64, gx: i64, gy: i64) -> f32 {
		let mut sum = 0.0f64;
		let mut count = 0u32;
		for y in gy - radius..gy + radius {
			for x in gx - radius..gx + radius {
				let v = source.sample(x, y);
				if !v.is_nan() {
					sum += v as f64;
					count += 1;
				}
			}
		}
		if count == 0 {
			f32::NAN
		} else {
			(sum / count as f64) as f32
		}
	}

	/// Stitch nine same-zoom sibling tiles (`[nw,n,ne,w,c,e,sw,s,se]`) into
	/// one tile shaped like the center. A missing neighbor contributes
	/// `NaN`; a missing center is an error.
	pub fn combine_neighbors(neighbors: [Option<HeightTile>; 9]) -> Result<Self, HeightTileError> {
		let center = neighbors[4].as_ref().ok_or(HeightTileError::MissingCenter)?;
		let (width, height) = (center.width(), center.height());
		Ok(Self(Inner::Combined { width, height, neighbors: Arc::new(neighbors) }))
	}

	/// Crop to the `(subx, suby)`-th child of a `2^subz x 2^subz` split of
	/// this tile.
	pub fn split(&self, subz: u32, subx: i64, suby: i64) -> Result<Self, HeightTileError> {
		let divs = 1i64 << subz;
		if subx < 0 || suby < 0 || subx >= divs || suby >= divs {
			return Err(HeightTileError::InvalidSplit);
		}

		let width = self.width() >> subz;
		let height = self.height() >> subz;
		Ok(Self(Inner::Split {
			source: Box::new(self.clone()),
			width,
			height,
			offset_x: subx * width,
			offset_y: suby * height,
		}))
	}

	/// Bilinear-upsample by `factor`, treating samples as pixel centers.
	pub fn subsample_pixel_centers(&self, factor: u32) -> Self {
		let factor = factor as i64;
		Self(Inner::Subsampled {
			width: self.width() * factor,
			height: self.height() * factor,
			factor,
			source: Box::new(self.clone()),
		})
	}

	/// Average pixel centers into grid (pixel-corner) vertices, shifting
	/// the coordinate reference from pixel-center to pixel-corner.
	pub fn average_pixel_centers_to_grid(&self, radius: u32) -> Self {
		let radius = radius as i64;
		Self(Inner::Averaged {
			width: self.width() + 1,
			height: self.height() + 1,
			radius,
			source: Box::new(self.clone()),
		})
	}

	/// Multiply every sample by `m` (NaN-preserving). Identity when `m == 1`.
	pub fn scale_elevation(&self, m: f64) -> Self {
		if m == 1.0 {
			return self.clone();
		}
		Self(Inner::Scaled {
			width: self.width(),
			height: self.height(),
			multiplier: m,
			source: Box::new(self.clone()),
		})
	}

	/// Snapshot `[-buffer, width+buffer) x [-buffer, height+buffer)` into a
	/// dense array and return a tile backed by array lookups. The only
	/// operation that allocates proportional to area.
	pub fn materialize(&self, buffer: u32) -> Self {
		tracy::zone!("HeightTile materialize");

		let buffer = buffer as i64;
		let (w, h) = (self.width(), self.height());
		let row_w = w + 2 * buffer;
		let row_h = h + 2 * buffer;
		let mut data = Vec::with_capacity((row_w * row_h).max(0) as usize);
		for y in -buffer..h + buffer {
			for x in -buffer..w + buffer {
				data.push(self.sample(x, y));
			}
		}

		Self(Inner::Materialized { width: w, height: h, buffer, data: data.into() })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;

	fn values_6x6() -> [HeightTile; 9] {
		// 0..36 row-major, split into nine 2x2 tiles in row-major dataset order.
		let grid: Vec<f32> = (0..36).map(|x| x as f32).collect();
		let tile_at = |tr: usize, tc: usize| {
			let mut data = Vec::with_capacity(4);
			for r in 0..2 {
				for c in 0..2 {
					data.push(grid[(tr * 2 + r) * 6 + tc * 2 + c]);
				}
			}
			HeightTile::from_samples(2, 2, data)
		};
		[
			tile_at(0, 0),
			tile_at(0, 1),
			tile_at(0, 2),
			tile_at(1, 0),
			tile_at(1, 1),
			tile_at(1, 2),
			tile_at(2, 0),
			tile_at(2, 1),
			tile_at(2, 2),
		]
	}

	fn combined_6x6() -> HeightTile {
		let [nw, n, ne, w, c, e, sw, s, se] = values_6x6();
		HeightTile::combine_neighbors([
			Some(nw),
			Some(n),
			Some(ne),
			Some(w),
			Some(c),
			Some(e),
			Some(sw),
			Some(s),
			Some(se),
		])
		.unwrap()
	}

	#[test]
	fn s1_stitched_sampling() {
		let tile = combined_6x6();
		assert_relative_eq!(tile.sample(-1, -1), 7.0);
		assert_relative_eq!(tile.sample(0, -1), 8.0);
		assert_relative_eq!(tile.sample(-1, 0), 13.0);
		assert_relative_eq!(tile.sample(2, 2), 28.0);
		assert_relative_eq!(tile.sample(0, 2), 26.0);
	}

	#[test]
	fn combine_neighbors_requires_center() {
		let neighbors: [Option<HeightTile>; 9] = Default::default();
		assert!(matches!(
			HeightTile::combine_neighbors(neighbors),
			Err(HeightTileError::MissingCenter)
		));
	}

	#[test]
	fn missing_neighbor_is_nan() {
		let [_, n, ne, w, c, e, sw, s, se] = values_6x6();
		let tile = HeightTile::combine_neighbors([None, Some(n), Some(ne), Some(w), Some(c), Some(e), Some(sw), Some(s), Some(se)]).unwrap();
		assert!(tile.sample(-1, -1).is_nan());
	}

	#[test]
	fn out_of_grid_beyond_one_tile_is_nan() {
		let tile = combined_6x6();
		assert!(tile.sample(-3, 0).is_nan());
		assert!(tile.sample(4, 0).is_nan());
	}

	#[test]
	fn s2_pixel_center_to_grid_average() {
		let tile = combined_6x6().average_pixel_centers_to_grid(1);
		assert_eq!(tile.width(), 3);
		assert_eq!(tile.height(), 3);
		assert_relative_eq!(tile.sample(0, 0), 10.5);
		assert_relative_eq!(tile.sample(2, 2), 24.5);
	}

	#[test]
	fn upsample_then_average_matches_direct_average_at_interior_points() {
		// Property 6: for a linear field, averaging pixel centers to grid
		// after a k-factor upsample must agree with averaging the
		// unupsampled field directly, at every grid vertex the upsample
		// passes through exactly (interior points, away from the border).
		let w = 6;
		let h = 6;
		let data: Vec<f32> = (0..h).flat_map(|y| (0..w).map(move |x| (x + 2 * y) as f32)).collect();
		let base = HeightTile::from_samples(w as usize, h as usize, data);

		let direct = base.average_pixel_centers_to_grid(1);
		let upsampled = base.subsample_pixel_centers(2).average_pixel_centers_to_grid(1);

		for gy in 1..5 {
			for gx in 1..5 {
				assert_relative_eq!(upsampled.sample(gx * 2, gy * 2), direct.sample(gx, gy), epsilon = 1e-4);
			}
		}
	}

	#[test]
	fn split_matches_translated_sample() {
		let tile = combined_6x6();
		let split = tile.split(1, 1, 0).unwrap();
		assert_eq!(split.width(), 1);
		assert_eq!(split.height(), 1);
		for y in 0..1 {
			for x in 0..1 {
				assert_relative_eq!(split.sample(x, y), tile.sample(x + 1, y));
			}
		}
	}

	#[test]
	fn split_rejects_out_of_range_indices() {
		let tile = combined_6x6();
		assert!(matches!(tile.split(1, 2, 0), Err(HeightTileError::InvalidSplit)));
	}

	#[test]
	fn average_skips_nan_samples() {
		let tile = HeightTile::from_samples(2, 2, vec![f32::NAN, f32::NAN, 1.0, 2.0]);
		let avg = tile.average_pixel_centers_to_grid(1);
		assert_relative_eq!(avg.sample(1, 1), 1.5);
	}

	#[test]
	fn all_nan_neighborhood_is_nan() {
		let tile = HeightTile::from_samples(1, 1, vec![f32::NAN]);
		let avg = tile.average_pixel_centers_to_grid(1);
		assert!(avg.sample(0, 0).is_nan());
	}

	#[test]
	fn scale_elevation_is_identity_for_one() {
		let tile = HeightTile::from_samples(1, 1, vec![5.0]);
		let scaled = tile.scale_elevation(1.0);
		assert_relative_eq!(scaled.sample(0, 0), 5.0);
	}

	#[test]
	fn scale_elevation_preserves_nan() {
		let tile = HeightTile::from_samples(1, 1, vec![f32::NAN]);
		let scaled = tile.scale_elevation(3.3);
		assert!(scaled.sample(0, 0).is_nan());
	}

	#[test]
	fn materialize_matches_lazy_sampling() {
		let tile = combined_6x6();
		let dense = tile.materialize(2);
		for y in -2..4 {
			for x in -2..4 {
				let lazy = tile.sample(x, y);
				let mat = dense.sample(x, y);
				if lazy.is_nan() {
					assert!(mat.is_nan());
				} else {
					assert_relative_eq!(lazy, mat);
				}
			}
		}
	}
}
