use crate::{DemError, DemTile};

/// Raster elevation encoding. See §4.1.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Encoding {
	/// `ele = -10000 + (R*65536 + G*256 + B) * 0.1`
	Mapbox,
	/// `ele = R*256 + G + B/256 - 32768`
	Terrarium,
}

impl Encoding {
	pub fn parse(name: &str) -> Result<Self, DemError> {
		match name {
			"mapbox" => Ok(Self::Mapbox),
			"terrarium" => Ok(Self::Terrarium),
			other => Err(DemError::UnknownEncoding(other.to_string())),
		}
	}

	#[inline]
	fn decode_pixel(&self, r: u8, g: u8, b: u8) -> f32 {
		match self {
			Encoding::Mapbox => -10000.0 + (r as u32 * 65536 + g as u32 * 256 + b as u32) as f32 * 0.1,
			Encoding::Terrarium => r as f32 * 256.0 + g as f32 + b as f32 / 256.0 - 32768.0,
		}
	}
}

/// Decode a 4-channel (RGBA) raster into meters. `rgba` must be
/// `4 * width * height` bytes; alpha is ignored. Writes the raw computed
/// value per pixel — validity filtering happens in `HeightTile::from_raw`.
pub fn decode_raster(rgba: &[u8], width: usize, height: usize, encoding: Encoding) -> Result<DemTile, DemError> {
	let expected = width * height * 4;
	if rgba.len() != expected {
		log::error!("raster size mismatch: got {} bytes, expected {}", rgba.len(), expected);
		return Err(DemError::SizeMismatch { got: rgba.len(), expected });
	}

	let data = rgba
		.chunks_exact(4)
		.map(|px| encoding.decode_pixel(px[0], px[1], px[2]))
		.collect();

	Ok(DemTile::new(width, height, data))
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;

	#[test]
	fn mapbox_formula() {
		let rgba = [1u8, 2, 3, 255];
		let tile = decode_raster(&rgba, 1, 1, Encoding::Mapbox).unwrap();
		let expected = -10000.0 + (1u32 * 65536 + 2 * 256 + 3) as f32 * 0.1;
		assert_relative_eq!(tile.data[0], expected);
	}

	#[test]
	fn terrarium_formula() {
		let rgba = [10u8, 20, 30, 255];
		let tile = decode_raster(&rgba, 1, 1, Encoding::Terrarium).unwrap();
		let expected = 10.0 * 256.0 + 20.0 + 30.0 / 256.0 - 32768.0;
		assert_relative_eq!(tile.data[0], expected);
	}

	#[test]
	fn rejects_mismatched_length() {
		let rgba = [0u8; 3];
		assert!(decode_raster(&rgba, 1, 1, Encoding::Mapbox).is_err());
	}

	#[test]
	fn unknown_encoding_rejected() {
		assert!(Encoding::parse("png16").is_err());
	}
}
