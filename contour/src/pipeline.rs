//! Tile pipeline orchestration (§4.6): resolves overzoom, fetches and
//! stitches nine neighbor grids, upsamples/averages into a grid-aligned
//! field, traces isolines, and encodes the result as MVT.

use std::sync::Arc;

use dem::{DemTile, Encoding, TileKey};
use futures::future::{join_all, FutureExt};

use crate::{
	cache::Cache,
	cancel::CancelSignal,
	error::ContourError,
	external::{Decoder, Fetcher},
	height_tile::HeightTile,
	mvt::{self, Feature, GeomType, Layer, PropertyValue},
	options::{ContourOptions, GlobalContourOptions},
	tracer,
};

const NEIGHBOR_OFFSETS: [(i64, i64); 9] = [(-1, -1), (0, -1), (1, -1), (-1, 0), (0, 0), (1, 0), (-1, 1), (0, 1), (1, 1)];

pub struct PipelineConfig {
	/// URL template with `{z}`/`{x}`/`{y}` placeholders.
	pub url_template: String,
	pub encoding: Encoding,
	pub maxzoom: u8,
	/// Forwarded to the [`Fetcher`] implementation; enforcing it is the
	/// fetcher's responsibility (§5 "Timeouts").
	pub timeout_ms: u32,
	pub cache_size: usize,
}

struct Inner {
	config: PipelineConfig,
	fetcher: Arc<dyn Fetcher>,
	decoder: Arc<dyn Decoder>,
	bytes_cache: Cache<TileKey, Arc<Vec<u8>>, ContourError>,
	grid_cache: Cache<TileKey, DemTile, ContourError>,
	contour_cache: Cache<(TileKey, String), Arc<Vec<u8>>, ContourError>,
}

/// Orchestrates the three caches (raw bytes, decoded grid, rendered
/// contour) behind [`ContourPipeline::fetch_contour_tile`]. Cheap to
/// clone: internally an `Arc`.
#[derive(Clone)]
pub struct ContourPipeline(Arc<Inner>);

impl ContourPipeline {
	pub fn new(config: PipelineConfig, fetcher: Arc<dyn Fetcher>, decoder: Arc<dyn Decoder>) -> Self {
		let cache_size = config.cache_size;
		Self(Arc::new(Inner {
			config,
			fetcher,
			decoder,
			bytes_cache: Cache::new(cache_size),
			grid_cache: Cache::new(cache_size),
			contour_cache: Cache::new(cache_size),
		}))
	}

	fn url_for(&self, key: TileKey) -> String {
		self.0.config.url_template.replace("{z}", &key.z.to_string()).replace("{x}", &key.x.to_string()).replace(
			"{y}",
			&key.y.to_string(),
		)
	}

	async fn fetch_bytes(&self, key: TileKey, cancel: CancelSignal) -> Result<Arc<Vec<u8>>, ContourError> {
		let url = self.url_for(key);
		let fetcher = self.0.fetcher.clone();
		self.0
			.bytes_cache
			.get(
				key,
				move |_k, cancel| {
					let fetcher = fetcher.clone();
					let url = url.clone();
					async move { fetcher.fetch(url, cancel).await.map(|r| Arc::new(r.bytes)) }
				},
				cancel,
			)
			.await
	}

	async fn fetch_dem(&self, key: TileKey, cancel: CancelSignal) -> Result<DemTile, ContourError> {
		let encoding = self.0.config.encoding;
		let pipeline = self.clone();
		self.0
			.grid_cache
			.get(
				key,
				move |_k, cancel| {
					let pipeline = pipeline.clone();
					async move {
						let bytes = pipeline.fetch_bytes(key, cancel.clone()).await?;
						let decoder = pipeline.0.decoder.clone();
						decoder.decode((*bytes).clone(), encoding, cancel).await
					}
				},
				cancel,
			)
			.await
	}

	/// Fetch, stitch, trace and encode the contour tile at `(z, x, y)`.
	/// Empty `levels`, a missing center neighbor, or a canceled request all
	/// resolve to an empty (zero-feature) tile rather than an error (§4.6
	/// step 1, step 5).
	pub async fn fetch_contour_tile(
		&self, z: u8, x: u32, y: u32, global: &GlobalContourOptions, cancel: CancelSignal,
	) -> Result<Vec<u8>, ContourError> {
		let options = global.resolve(z as u32);
		if options.levels.is_empty() {
			return Ok(Vec::new());
		}

		let request_key = TileKey::new(z, x, y);
		let cache_key = (request_key, global.encode());
		let pipeline = self.clone();

		let bytes = self
			.0
			.contour_cache
			.get(
				cache_key,
				move |_k, cancel| {
					let pipeline = pipeline.clone();
					let options = options.clone();
					async move { pipeline.render_contour_tile(request_key, options, cancel).await.map(Arc::new) }
				},
				cancel,
			)
			.await?;

		Ok((*bytes).clone())
	}

	async fn render_contour_tile(&self, key: TileKey, options: ContourOptions, cancel: CancelSignal) -> Result<Vec<u8>, ContourError> {
		let src_z = key.z.saturating_sub(options.overzoom as u8).min(self.0.config.maxzoom);
		let sub_z = key.z.saturating_sub(src_z);
		let (parent, subx, suby) = key.zoom_out(sub_z);
		let dim = parent.dim() as i64;

		let mut futs = Vec::with_capacity(9);
		for &(di, dj) in &NEIGHBOR_OFFSETS {
			let ny = parent.y as i64 + dj;
			if ny < 0 || ny >= dim {
				futs.push(async { None::<DemTile> }.boxed());
				continue;
			}
			let nx = (parent.x as i64 + di).rem_euclid(dim) as u32;
			let neighbor_key = TileKey::new(src_z, nx, ny as u32);
			let pipeline = self.clone();
			let cancel = cancel.clone();
			futs.push(async move { pipeline.fetch_dem(neighbor_key, cancel).await.ok() }.boxed());
		}
		let dem_tiles = join_all(futs).await;

		if cancel.is_canceled() {
			return Ok(Vec::new());
		}

		let mut neighbors: [Option<HeightTile>; 9] = Default::default();
		for (i, tile) in dem_tiles.into_iter().enumerate() {
			neighbors[i] = tile.and_then(|dem| HeightTile::from_raw(dem).split(sub_z as u32, subx as i64, suby as i64).ok());
		}

		let stitched = match HeightTile::combine_neighbors(neighbors) {
			Ok(t) => t,
			Err(e) => {
				log::warn!("center tile missing for {key:?}, returning empty contour tile: {e}");
				return Ok(Vec::new());
			},
		};

		let subsample_below = options.subsample_below as i64;
		let mut grid = if stitched.width() >= subsample_below {
			stitched.materialize(2)
		} else {
			let mut t = stitched;
			while t.width() < subsample_below {
				t = t.subsample_pixel_centers(2).materialize(2);
			}
			t
		};
		grid = grid.average_pixel_centers_to_grid(1).scale_elevation(options.multiplier).materialize(1);

		if grid.width() < 2 || grid.height() < 2 {
			return Ok(Vec::new());
		}

		let interval = options.levels[0];
		let isolines = tracer::trace(&grid, interval, options.extent, options.buffer as i64);

		let features = isolines
			.into_iter()
			.map(|(k, polylines)| {
				let elevation = k as f64 * interval;
				Feature {
					properties: vec![
						(options.elevation_key.clone(), PropertyValue::Double(elevation)),
						(options.level_key.clone(), PropertyValue::Int(level_for(k, interval, &options.levels))),
					],
					geom_type: GeomType::LineString,
					lines: polylines,
				}
			})
			.collect();

		let layer = Layer { name: options.contour_layer.clone(), extent: options.extent, features };
		Ok(mvt::encode_tile(&[layer]))
	}
}

/// The greatest index `i` such that `elevation` (`k * interval`) is an exact
/// multiple of `levels[i]`, or 0 if none qualify besides the trivially-true
/// `levels[0]` (§4.6 step 9).
fn level_for(k: i64, interval: f64, levels: &[f64]) -> i64 {
	let mut best = 0i64;
	for (i, level) in levels.iter().enumerate() {
		let ratio = (level / interval).round();
		if ratio > 0.0 && k.rem_euclid(ratio as i64) == 0 {
			best = i as i64;
		}
	}
	best
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;

	use futures_lite::future::block_on;

	use super::*;

	struct StaticFetcher {
		bytes: Vec<u8>,
		calls: Mutex<u32>,
	}

	impl Fetcher for StaticFetcher {
		fn fetch(&self, _url: String, _cancel: CancelSignal) -> futures::future::BoxFuture<'static, Result<crate::external::FetchResponse, ContourError>> {
			*self.calls.lock().unwrap() += 1;
			let bytes = self.bytes.clone();
			async move { Ok(crate::external::FetchResponse { bytes, expires_secs: None, cache_control: None }) }.boxed()
		}
	}

	struct FlatDecoder {
		width: usize,
		height: usize,
		elevation: f32,
	}

	impl Decoder for FlatDecoder {
		fn decode(
			&self, _bytes: Vec<u8>, _encoding: Encoding, _cancel: CancelSignal,
		) -> futures::future::BoxFuture<'static, Result<DemTile, ContourError>> {
			let tile = DemTile::new(self.width, self.height, vec![self.elevation; self.width * self.height]);
			async move { Ok(tile) }.boxed()
		}
	}

	fn flat_pipeline(elevation: f32) -> (ContourPipeline, Arc<StaticFetcher>) {
		let fetcher = Arc::new(StaticFetcher { bytes: vec![0; 4], calls: Mutex::new(0) });
		let decoder = Arc::new(FlatDecoder { width: 4, height: 4, elevation });
		let pipeline = ContourPipeline::new(
			PipelineConfig { url_template: "http://x/{z}/{x}/{y}".into(), encoding: Encoding::Terrarium, maxzoom: 12, timeout_ms: 1000, cache_size: 64 },
			fetcher.clone(),
			decoder,
		);
		(pipeline, fetcher)
	}

	#[test]
	fn empty_levels_short_circuits_without_fetching() {
		let (pipeline, fetcher) = flat_pipeline(100.0);
		let result = block_on(pipeline.fetch_contour_tile(5, 1, 1, &GlobalContourOptions::default(), CancelSignal::new())).unwrap();
		assert!(result.is_empty());
		assert_eq!(*fetcher.calls.lock().unwrap(), 0);
	}

	#[test]
	fn flat_field_produces_no_contours() {
		let mut global = GlobalContourOptions::default();
		global.thresholds.insert(0, vec![10.0]);
		let (pipeline, _fetcher) = flat_pipeline(100.0);
		let result = block_on(pipeline.fetch_contour_tile(5, 1, 1, &global, CancelSignal::new())).unwrap();
		// No crossings anywhere: MVT has a layer header but zero features,
		// so the encoded bytes are non-empty but contain no feature fields.
		assert!(!result.is_empty());
	}

	#[test]
	fn level_for_picks_the_greatest_matching_index() {
		let levels = vec![10.0, 50.0, 100.0];
		assert_eq!(level_for(1, 10.0, &levels), 0);
		assert_eq!(level_for(5, 10.0, &levels), 1); // 50 / 10
		assert_eq!(level_for(10, 10.0, &levels), 2); // 100 / 10
	}
}
