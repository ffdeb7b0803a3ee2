//! Per-request contour styling options and their canonical URL encoding
//! (§3 "ContourOptions", §6 "Option canonical URL encoding").
//!
//! [`GlobalContourOptions`] is what a caller configures once per tile
//! source: a zoom-keyed table of level spacings (`thresholds`) plus the
//! styling knobs that don't vary by zoom. [`ContourOptions`] is what the
//! pipeline actually consumes for one request, with `thresholds` resolved
//! down to a concrete `levels` list for the request's zoom.

use std::collections::BTreeMap;

use crate::error::ContourError;

#[derive(Clone, Debug, PartialEq)]
pub struct GlobalContourOptions {
	/// Zoom level to the sorted list of elevation spacings active from
	/// that zoom upward.
	pub thresholds: BTreeMap<u32, Vec<f64>>,
	pub multiplier: f64,
	pub overzoom: u32,
	pub buffer: u32,
	pub extent: u32,
	pub contour_layer: String,
	pub elevation_key: String,
	pub level_key: String,
	pub subsample_below: u32,
}

impl Default for GlobalContourOptions {
	fn default() -> Self {
		Self {
			thresholds: BTreeMap::new(),
			multiplier: 1.0,
			overzoom: 0,
			buffer: 1,
			extent: 4096,
			contour_layer: "contour".to_string(),
			elevation_key: "ele".to_string(),
			level_key: "level".to_string(),
			subsample_below: 0,
		}
	}
}

/// A single request's resolved options: `thresholds` collapsed to the
/// `levels` list that applies at this request's zoom.
#[derive(Clone, Debug, PartialEq)]
pub struct ContourOptions {
	pub levels: Vec<f64>,
	pub multiplier: f64,
	pub overzoom: u32,
	pub buffer: u32,
	pub extent: u32,
	pub contour_layer: String,
	pub elevation_key: String,
	pub level_key: String,
	pub subsample_below: u32,
}

impl GlobalContourOptions {
	/// Resolve `levels` for zoom `z`: the threshold entry at the greatest
	/// key `<= z`, or an empty list if `z` is below every configured
	/// threshold zoom.
	pub fn resolve(&self, z: u32) -> ContourOptions {
		let levels = self.thresholds.range(..=z).next_back().map(|(_, v)| v.clone()).unwrap_or_default();

		ContourOptions {
			levels,
			multiplier: self.multiplier,
			overzoom: self.overzoom,
			buffer: self.buffer,
			extent: self.extent,
			contour_layer: self.contour_layer.clone(),
			elevation_key: self.elevation_key.clone(),
			level_key: self.level_key.clone(),
			subsample_below: self.subsample_below,
		}
	}

	fn encode_thresholds(&self) -> String {
		self.thresholds
			.iter()
			.map(|(z, levels)| {
				let mut parts = vec![z.to_string()];
				parts.extend(levels.iter().map(f64::to_string));
				parts.join("*")
			})
			.collect::<Vec<_>>()
			.join("~")
	}

	fn decode_thresholds(s: &str) -> Result<BTreeMap<u32, Vec<f64>>, ContourError> {
		let bad = |which: &str| ContourError::InvalidInput { which: which.to_string() };
		let mut thresholds = BTreeMap::new();
		if s.is_empty() {
			return Ok(thresholds);
		}
		for entry in s.split('~') {
			let mut parts = entry.split('*');
			let z: u32 = parts.next().ok_or_else(|| bad("thresholds"))?.parse().map_err(|_| bad("thresholds"))?;
			let levels: Vec<f64> = parts.map(|v| v.parse::<f64>().map_err(|_| bad("thresholds"))).collect::<Result<_, _>>()?;
			thresholds.insert(z, levels);
		}
		Ok(thresholds)
	}

	/// Sort keys lexicographically, URL-encode each value, and join
	/// `key=value` pairs with `,` (§6).
	pub fn encode(&self) -> String {
		let mut fields: Vec<(&str, String)> = vec![
			("buffer", self.buffer.to_string()),
			("contourLayer", self.contour_layer.clone()),
			("elevationKey", self.elevation_key.clone()),
			("extent", self.extent.to_string()),
			("levelKey", self.level_key.clone()),
			("multiplier", self.multiplier.to_string()),
			("overzoom", self.overzoom.to_string()),
			("subsampleBelow", self.subsample_below.to_string()),
			("thresholds", self.encode_thresholds()),
		];
		fields.sort_by_key(|(k, _)| *k);
		fields.into_iter().map(|(k, v)| format!("{k}={}", percent_encode(&v))).collect::<Vec<_>>().join(",")
	}

	pub fn decode(s: &str) -> Result<Self, ContourError> {
		let bad = |which: &str| ContourError::InvalidInput { which: which.to_string() };
		let mut opts = Self::default();
		if s.is_empty() {
			return Ok(opts);
		}
		for pair in s.split(',') {
			let (key, raw_value) = pair.split_once('=').ok_or_else(|| bad("option pair"))?;
			let value = percent_decode(raw_value);
			match key {
				"buffer" => opts.buffer = value.parse().map_err(|_| bad("buffer"))?,
				"contourLayer" => opts.contour_layer = value,
				"elevationKey" => opts.elevation_key = value,
				"extent" => opts.extent = value.parse().map_err(|_| bad("extent"))?,
				"levelKey" => opts.level_key = value,
				"multiplier" => opts.multiplier = value.parse().map_err(|_| bad("multiplier"))?,
				"overzoom" => opts.overzoom = value.parse().map_err(|_| bad("overzoom"))?,
				"subsampleBelow" => opts.subsample_below = value.parse().map_err(|_| bad("subsampleBelow"))?,
				"thresholds" => opts.thresholds = Self::decode_thresholds(&value)?,
				other => return Err(bad(other)),
			}
		}
		Ok(opts)
	}
}

fn percent_encode(s: &str) -> String { url::form_urlencoded::byte_serialize(s.as_bytes()).collect() }

fn percent_decode(s: &str) -> String {
	url::form_urlencoded::parse(format!("v={s}").as_bytes())
		.next()
		.map(|(_, v)| v.into_owned())
		.unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_options() -> GlobalContourOptions {
		let mut thresholds = BTreeMap::new();
		thresholds.insert(11, vec![10.0, 50.0]);
		thresholds.insert(14, vec![5.0, 20.0, 100.0]);
		GlobalContourOptions {
			thresholds,
			multiplier: 3.28084,
			overzoom: 1,
			buffer: 2,
			extent: 2048,
			contour_layer: "my contours".to_string(),
			elevation_key: "ele".to_string(),
			level_key: "lvl".to_string(),
			subsample_below: 128,
		}
	}

	#[test]
	fn round_trips_through_encode_decode() {
		let opts = sample_options();
		let decoded = GlobalContourOptions::decode(&opts.encode()).unwrap();
		assert_eq!(decoded, opts);
	}

	#[test]
	fn resolves_levels_for_the_greatest_threshold_at_or_below_zoom() {
		let opts = sample_options();
		assert_eq!(opts.resolve(10).levels, Vec::<f64>::new());
		assert_eq!(opts.resolve(11).levels, vec![10.0, 50.0]);
		assert_eq!(opts.resolve(13).levels, vec![10.0, 50.0]);
		assert_eq!(opts.resolve(14).levels, vec![5.0, 20.0, 100.0]);
		assert_eq!(opts.resolve(20).levels, vec![5.0, 20.0, 100.0]);
	}

	#[test]
	fn default_has_no_thresholds() { assert!(GlobalContourOptions::default().resolve(5).levels.is_empty()) }

	#[test]
	fn encoding_percent_escapes_layer_name_spaces() {
		let opts = sample_options();
		assert!(opts.encode().contains("contourLayer=my%20contours") || opts.encode().contains("contourLayer=my+contours"));
	}

	#[test]
	fn unknown_key_is_rejected() { assert!(GlobalContourOptions::decode("bogus=1").is_err()) }
}
