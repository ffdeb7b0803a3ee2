//! Local directory tile source: `{root}/{z}/{x}/{y}.png`, read straight off
//! disk rather than fetched over HTTP upstream.

use std::path::PathBuf;

use contour::{CancelSignal, ContourError, Decoder, FetchResponse, Fetcher};
use dem::Encoding;
use futures::future::{BoxFuture, FutureExt};
use png::ColorType;

pub struct ArchiveFetcher {
	pub root: PathBuf,
}

impl Fetcher for ArchiveFetcher {
	fn fetch(&self, url: String, _cancel: CancelSignal) -> BoxFuture<'static, Result<FetchResponse, ContourError>> {
		let path = self.root.join(url);
		async move {
			let bytes = std::fs::read(&path).map_err(|e| ContourError::FetchFailed { reason: format!("{}: {}", path.display(), e) })?;
			Ok(FetchResponse { bytes, expires_secs: None, cache_control: None })
		}
		.boxed()
	}
}

pub struct PngDecoder;

impl Decoder for PngDecoder {
	fn decode(&self, bytes: Vec<u8>, encoding: Encoding, _cancel: CancelSignal) -> BoxFuture<'static, Result<dem::DemTile, ContourError>> {
		async move {
			let decoder = png::Decoder::new(bytes.as_slice());
			let mut reader = decoder.read_info().map_err(|e| ContourError::DecodeFailed { reason: e.to_string() })?;
			let mut buf = vec![0; reader.output_buffer_size()];
			let info = reader.next_frame(&mut buf).map_err(|e| ContourError::DecodeFailed { reason: e.to_string() })?;

			let rgba = match info.color_type {
				ColorType::Rgba => buf,
				ColorType::Rgb => buf.chunks_exact(3).flat_map(|px| [px[0], px[1], px[2], 255]).collect(),
				other => return Err(ContourError::DecodeFailed { reason: format!("unsupported PNG color type {:?}", other) }),
			};

			dem::decode_raster(&rgba, info.width as usize, info.height as usize, encoding).map_err(ContourError::from)
		}
		.boxed()
	}
}
