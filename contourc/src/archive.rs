//! Local directory tile source: `{root}/{z}/{x}/{y}.png`, read straight off
//! disk instead of over HTTP. Both `info` and `render` walk the same layout.

use std::path::{Path, PathBuf};

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

/// Total size in bytes and per-zoom tile counts for the archive rooted at
/// `root`.
pub fn scan(root: &Path) -> std::io::Result<(u64, Vec<(u32, u32)>)> {
	let mut total_bytes = 0u64;
	let mut counts = Vec::new();

	let mut zoom_dirs: Vec<_> = std::fs::read_dir(root)?.filter_map(|e| e.ok()).filter(|e| e.path().is_dir()).collect();
	zoom_dirs.sort_by_key(|e| e.file_name());

	for zoom_dir in zoom_dirs {
		let Some(z) = zoom_dir.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
			continue;
		};
		let mut tile_count = 0u32;
		for x_dir in std::fs::read_dir(zoom_dir.path())?.filter_map(|e| e.ok()).filter(|e| e.path().is_dir()) {
			for tile in std::fs::read_dir(x_dir.path())?.filter_map(|e| e.ok()) {
				if tile.path().extension().and_then(|e| e.to_str()) == Some("png") {
					tile_count += 1;
					total_bytes += tile.metadata().map(|m| m.len()).unwrap_or(0);
				}
			}
		}
		counts.push((z, tile_count));
	}

	Ok((total_bytes, counts))
}
