use std::{error::Error, num::NonZeroUsize, path::PathBuf, sync::Arc};

use contour::{CancelSignal, ContourPipeline, GlobalContourOptions, PipelineConfig};
use dem::Encoding;
use futures_lite::future::block_on;
use rouille::{try_or_400::ErrJson, Request, Response};
use url::Url;

mod archive;

use archive::{ArchiveFetcher, PngDecoder};

fn parse_request(req: &Request) -> Result<Option<(u8, u32, u32, GlobalContourOptions)>, Box<dyn Error>> {
	let url = Url::parse(&format!("http://127.0.0.1{}", req.raw_url()))?;

	let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
	let ["contour", z, x, y_ext] = segments.as_slice() else {
		return Ok(None);
	};
	let Some(y) = y_ext.strip_suffix(".mvt") else {
		return Ok(None);
	};

	let z: u8 = z.parse()?;
	let x: u32 = x.parse()?;
	let y: u32 = y.parse()?;

	let mut options = GlobalContourOptions::default();
	for (key, value) in url.query_pairs() {
		if key == "options" {
			options = GlobalContourOptions::decode(&value)?;
		}
	}

	Ok(Some((z, x, y, options)))
}

fn main() {
	env_logger::init();

	let mut args = std::env::args().skip(1);
	let input = PathBuf::from(args.next().unwrap_or_else(|| {
		println!("Usage: {} <archive-path> [encoding] [maxzoom]", std::env::args().next().unwrap());
		std::process::exit(1);
	}));
	let encoding = args.next().unwrap_or_else(|| "terrarium".to_string());
	let encoding = Encoding::parse(&encoding).unwrap_or_else(|e| {
		eprintln!("{}", e);
		std::process::exit(1);
	});
	let maxzoom: u8 = args.next().and_then(|s| s.parse().ok()).unwrap_or(14);

	let pipeline = ContourPipeline::new(
		PipelineConfig { url_template: "{z}/{x}/{y}.png".to_string(), encoding, maxzoom, timeout_ms: 10_000, cache_size: 512 },
		Arc::new(ArchiveFetcher { root: input }),
		Arc::new(PngDecoder),
	);

	rouille::start_server_with_pool(
		"0.0.0.0:42069",
		std::thread::available_parallelism().ok().map(NonZeroUsize::get),
		move |req| match (|req: &Request| -> Result<_, Box<dyn Error>> {
			tracy::zone!("Handle request");

			let Some((z, x, y, options)) = parse_request(req)? else {
				return Ok(Response::empty_404());
			};

			let tile = block_on(pipeline.fetch_contour_tile(z, x, y, &options, CancelSignal::new()))?;
			Ok(Response::from_data("application/vnd.mapbox-vector-tile", tile))
		})(req)
		{
			Ok(x) => x,
			Err(e) => {
				log::error!("request failed: {}", e);
				Response::json(&ErrJson::from_err(&*e)).with_status_code(400)
			},
		},
	);
}
