use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use clap::Args;
use contour::{CancelSignal, ContourPipeline, GlobalContourOptions, PipelineConfig};
use dem::Encoding;
use futures_lite::future::block_on;

use crate::archive::{ArchiveFetcher, PngDecoder};

#[derive(Args)]
/// Render one contour tile from a local tile archive to a `.mvt` file.
pub struct Render {
	/// Root of the `{z}/{x}/{y}.png` tile archive.
	input: PathBuf,
	z: u8,
	x: u32,
	y: u32,
	#[clap(short = 'o', long = "output")]
	output: PathBuf,
	#[clap(long = "encoding", default_value = "terrarium")]
	encoding: String,
	/// Comma-separated elevation spacings, smallest first, e.g. "10,50,100".
	#[clap(short = 'l', long = "levels", use_value_delimiter = true)]
	levels: Vec<f64>,
	#[clap(long = "multiplier", default_value_t = 1.0)]
	multiplier: f64,
	#[clap(long = "overzoom", default_value_t = 0)]
	overzoom: u32,
	#[clap(long = "buffer", default_value_t = 1)]
	buffer: u32,
	#[clap(long = "extent", default_value_t = 4096)]
	extent: u32,
	#[clap(long = "maxzoom", default_value_t = 14)]
	maxzoom: u8,
	#[clap(long = "contour-layer", default_value = "contour")]
	contour_layer: String,
	#[clap(long = "elevation-key", default_value = "ele")]
	elevation_key: String,
	#[clap(long = "level-key", default_value = "level")]
	level_key: String,
	#[clap(long = "subsample-below", default_value_t = 0)]
	subsample_below: u32,
}

pub fn render(render: Render) {
	tracy::zone!("Render tile");

	let encoding = match Encoding::parse(&render.encoding) {
		Ok(x) => x,
		Err(err) => {
			eprintln!("unknown encoding: {}", err);
			return;
		},
	};

	if render.levels.is_empty() {
		eprintln!("at least one --levels value is required");
		return;
	}

	let mut thresholds = BTreeMap::new();
	thresholds.insert(0, render.levels);
	let global = GlobalContourOptions {
		thresholds,
		multiplier: render.multiplier,
		overzoom: render.overzoom,
		buffer: render.buffer,
		extent: render.extent,
		contour_layer: render.contour_layer,
		elevation_key: render.elevation_key,
		level_key: render.level_key,
		subsample_below: render.subsample_below,
	};

	let pipeline = ContourPipeline::new(
		PipelineConfig { url_template: "{z}/{x}/{y}.png".to_string(), encoding, maxzoom: render.maxzoom, timeout_ms: 30_000, cache_size: 16 },
		Arc::new(ArchiveFetcher { root: render.input }),
		Arc::new(PngDecoder),
	);

	let result = block_on(pipeline.fetch_contour_tile(render.z, render.x, render.y, &global, CancelSignal::new()));
	match result {
		Ok(bytes) => {
			if let Err(err) = std::fs::write(&render.output, &bytes) {
				eprintln!("failed to write {}: {}", render.output.display(), err);
			} else {
				log::info!("wrote {} bytes to {}", bytes.len(), render.output.display());
			}
		},
		Err(err) => eprintln!("render failed: {}", err),
	}
}
