//! Mapbox Vector Tile (MVT) v2 encoder, restricted to the subset this crate
//! needs: LineString geometry, deduplicated key/value tables, zig-zag delta
//! coordinates (§4.4).
//!
//! The wire format is small and fixed, so this writes protobuf bytes
//! directly rather than pulling in a full protobuf toolchain — field
//! numbers and wire types below are the ones fixed by the vector-tile
//! spec and must not change.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeomType {
	Point = 1,
	LineString = 2,
	Polygon = 3,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
	Str(String),
	Float(f32),
	Double(f64),
	Int(i64),
	UInt(u64),
	SInt(i64),
	Bool(bool),
}

pub struct Feature {
	pub properties: Vec<(String, PropertyValue)>,
	pub geom_type: GeomType,
	/// One or more linestrings; a MultiLineString feature shares a cursor
	/// across parts (§4.4 "state (x, y) persists across rings").
	pub lines: Vec<Vec<i64>>,
}

pub struct Layer {
	pub name: String,
	pub extent: u32,
	pub features: Vec<Feature>,
}

fn write_varint(buf: &mut Vec<u8>, mut v: u64) {
	loop {
		let byte = (v & 0x7f) as u8;
		v >>= 7;
		if v != 0 {
			buf.push(byte | 0x80);
		} else {
			buf.push(byte);
			break;
		}
	}
}

fn write_tag(buf: &mut Vec<u8>, field: u32, wire_type: u32) { write_varint(buf, ((field as u64) << 3) | wire_type as u64) }

fn write_bytes_field(buf: &mut Vec<u8>, field: u32, bytes: &[u8]) {
	write_tag(buf, field, 2);
	write_varint(buf, bytes.len() as u64);
	buf.extend_from_slice(bytes);
}

fn write_string_field(buf: &mut Vec<u8>, field: u32, s: &str) { write_bytes_field(buf, field, s.as_bytes()) }

fn write_varint_field(buf: &mut Vec<u8>, field: u32, v: u64) {
	write_tag(buf, field, 0);
	write_varint(buf, v);
}

fn write_packed_varints(buf: &mut Vec<u8>, field: u32, values: &[u32]) {
	let mut inner = Vec::with_capacity(values.len() * 2);
	for &v in values {
		write_varint(&mut inner, v as u64);
	}
	write_bytes_field(buf, field, &inner);
}

#[inline]
fn zigzag(n: i64) -> u32 { ((n << 1) ^ (n >> 63)) as u32 }

#[inline]
fn command_integer(id: u32, count: u32) -> u32 { (id & 0x7) | (count << 3) }

/// Encodes a feature's lines into MVT's packed geometry command stream.
/// `lines` with fewer than two points are dropped (degenerate).
fn encode_geometry(lines: &[Vec<i64>]) -> Vec<u32> {
	let mut commands = Vec::new();
	let mut cursor = (0i64, 0i64);

	for line in lines {
		let n = line.len() / 2;
		if n < 2 {
			continue;
		}

		commands.push(command_integer(1, 1));
		let (x0, y0) = (line[0], line[1]);
		commands.push(zigzag(x0 - cursor.0));
		commands.push(zigzag(y0 - cursor.1));
		cursor = (x0, y0);

		commands.push(command_integer(2, (n - 1) as u32));
		for i in 1..n {
			let (x, y) = (line[i * 2], line[i * 2 + 1]);
			commands.push(zigzag(x - cursor.0));
			commands.push(zigzag(y - cursor.1));
			cursor = (x, y);
		}
	}

	commands
}

fn encode_value(value: &PropertyValue) -> Vec<u8> {
	let mut buf = Vec::new();
	match value {
		PropertyValue::Str(s) => write_string_field(&mut buf, 1, s),
		PropertyValue::Float(f) => {
			write_tag(&mut buf, 2, 5);
			buf.extend_from_slice(&f.to_le_bytes());
		},
		PropertyValue::Double(d) => {
			write_tag(&mut buf, 3, 1);
			buf.extend_from_slice(&d.to_le_bytes());
		},
		PropertyValue::Int(i) => write_varint_field(&mut buf, 4, *i as u64),
		PropertyValue::UInt(u) => write_varint_field(&mut buf, 5, *u),
		PropertyValue::SInt(i) => write_varint_field(&mut buf, 6, zigzag(*i) as u64),
		PropertyValue::Bool(b) => write_varint_field(&mut buf, 7, *b as u64),
	}
	buf
}

fn encode_feature(feature: &Feature, keys: &mut Vec<String>, values: &mut Vec<PropertyValue>) -> Vec<u8> {
	let mut buf = Vec::new();

	let mut tags = Vec::with_capacity(feature.properties.len() * 2);
	for (key, value) in &feature.properties {
		let key_idx = match keys.iter().position(|k| k == key) {
			Some(i) => i,
			None => {
				keys.push(key.clone());
				keys.len() - 1
			},
		};
		let value_idx = match values.iter().position(|v| v == value) {
			Some(i) => i,
			None => {
				values.push(value.clone());
				values.len() - 1
			},
		};
		tags.push(key_idx as u32);
		tags.push(value_idx as u32);
	}
	write_packed_varints(&mut buf, 2, &tags);
	write_varint_field(&mut buf, 3, feature.geom_type as u64);
	write_packed_varints(&mut buf, 4, &encode_geometry(&feature.lines));

	buf
}

fn encode_layer(layer: &Layer) -> Vec<u8> {
	let mut buf = Vec::new();
	write_string_field(&mut buf, 1, &layer.name);

	let mut keys: Vec<String> = Vec::new();
	let mut values: Vec<PropertyValue> = Vec::new();
	let feature_bytes: Vec<Vec<u8>> = layer.features.iter().map(|f| encode_feature(f, &mut keys, &mut values)).collect();

	for bytes in &feature_bytes {
		write_bytes_field(&mut buf, 2, bytes);
	}
	for key in &keys {
		write_string_field(&mut buf, 3, key);
	}
	for value in &values {
		write_bytes_field(&mut buf, 4, &encode_value(value));
	}
	write_varint_field(&mut buf, 5, layer.extent as u64);
	write_varint_field(&mut buf, 15, 2);

	buf
}

/// Encode a complete MVT tile from its layers. An empty `layers` slice
/// yields a zero-byte tile (§4.4, §5 "Empty output convention").
pub fn encode_tile(layers: &[Layer]) -> Vec<u8> {
	let mut buf = Vec::new();
	for layer in layers {
		write_bytes_field(&mut buf, 3, &encode_layer(layer));
	}
	buf
}

#[cfg(test)]
mod tests {
	use super::*;

	fn read_varint(buf: &[u8], pos: &mut usize) -> u64 {
		let mut result = 0u64;
		let mut shift = 0;
		loop {
			let byte = buf[*pos];
			*pos += 1;
			result |= ((byte & 0x7f) as u64) << shift;
			if byte & 0x80 == 0 {
				break;
			}
			shift += 7;
		}
		result
	}

	fn unzigzag(v: u32) -> i64 { ((v >> 1) as i64) ^ -((v & 1) as i64) }

	/// Minimal decoder covering exactly what this module writes, used to
	/// assert round-trip fidelity (property 7) without depending on an
	/// external MVT-reading crate.
	fn decode_single_layer_single_feature(bytes: &[u8]) -> (String, u32, Vec<(String, PropertyValue)>, Vec<i64>) {
		let mut pos = 0;
		let tag = read_varint(bytes, &mut pos);
		assert_eq!(tag >> 3, 3, "layer field");
		let len = read_varint(bytes, &mut pos) as usize;
		let layer_bytes = &bytes[pos..pos + len];

		let mut p = 0;
		let mut name = String::new();
		let mut extent = 4096u32;
		let mut raw_keys = Vec::new();
		let mut raw_values = Vec::new();
		let mut tags = Vec::new();
		let mut geometry = Vec::new();
		let mut geom_type = 0u64;

		while p < layer_bytes.len() {
			let tag = read_varint(layer_bytes, &mut p);
			let field = tag >> 3;
			let wire = tag & 0x7;
			match (field, wire) {
				(1, 2) => {
					let l = read_varint(layer_bytes, &mut p) as usize;
					name = String::from_utf8(layer_bytes[p..p + l].to_vec()).unwrap();
					p += l;
				},
				(2, 2) => {
					let l = read_varint(layer_bytes, &mut p) as usize;
					let feature_bytes = &layer_bytes[p..p + l];
					p += l;
					let mut fp = 0;
					while fp < feature_bytes.len() {
						let ftag = read_varint(feature_bytes, &mut fp);
						let ffield = ftag >> 3;
						match ffield {
							2 => {
								let fl = read_varint(feature_bytes, &mut fp) as usize;
								let mut tp = fp;
								while tp < fp + fl {
									tags.push(read_varint(feature_bytes, &mut tp) as u32);
								}
								fp += fl;
							},
							3 => {
								geom_type = read_varint(feature_bytes, &mut fp);
							},
							4 => {
								let gl = read_varint(feature_bytes, &mut fp) as usize;
								let mut gp = fp;
								while gp < fp + gl {
									geometry.push(read_varint(feature_bytes, &mut gp) as u32);
								}
								fp += gl;
							},
							_ => unreachable!("unexpected feature field"),
						}
					}
				},
				(3, 2) => {
					let l = read_varint(layer_bytes, &mut p) as usize;
					raw_keys.push(String::from_utf8(layer_bytes[p..p + l].to_vec()).unwrap());
					p += l;
				},
				(4, 2) => {
					let l = read_varint(layer_bytes, &mut p) as usize;
					let value_bytes = &layer_bytes[p..p + l];
					p += l;
					let mut vp = 0;
					let vtag = read_varint(value_bytes, &mut vp);
					let value = match vtag >> 3 {
						1 => {
							let l = read_varint(value_bytes, &mut vp) as usize;
							PropertyValue::Str(String::from_utf8(value_bytes[vp..vp + l].to_vec()).unwrap())
						},
						3 => PropertyValue::Double(f64::from_le_bytes(value_bytes[vp..vp + 8].try_into().unwrap())),
						4 => PropertyValue::Int(read_varint(value_bytes, &mut vp) as i64),
						_ => unreachable!("unexpected value type in test"),
					};
					raw_values.push(value);
				},
				(5, 0) => extent = read_varint(layer_bytes, &mut p) as u32,
				(15, 0) => {
					read_varint(layer_bytes, &mut p);
				},
				_ => unreachable!("unexpected layer field {field}"),
			}
		}

		assert_eq!(geom_type, GeomType::LineString as u64);

		let mut properties = Vec::new();
		for pair in tags.chunks(2) {
			properties.push((raw_keys[pair[0] as usize].clone(), raw_values[pair[1] as usize].clone()));
		}

		let mut cursor = (0i64, 0i64);
		let mut points = Vec::new();
		let mut gp = 0;
		while gp < geometry.len() {
			let cmd = geometry[gp];
			gp += 1;
			let id = cmd & 0x7;
			let count = cmd >> 3;
			for _ in 0..count {
				let dx = unzigzag(geometry[gp]);
				let dy = unzigzag(geometry[gp + 1]);
				gp += 2;
				cursor = (cursor.0 + dx, cursor.1 + dy);
				if id == 1 || id == 2 {
					points.push(cursor.0);
					points.push(cursor.1);
				}
			}
		}

		(name, extent, properties, points)
	}

	#[test]
	fn round_trips_a_linestring_feature() {
		let layer = Layer {
			name: "contours".into(),
			extent: 4096,
			features: vec![Feature {
				properties: vec![("ele".into(), PropertyValue::Double(100.0)), ("level".into(), PropertyValue::Int(2))],
				geom_type: GeomType::LineString,
				lines: vec![vec![10, 10, 20, 10, 20, 20]],
			}],
		};

		let bytes = encode_tile(&[layer]);
		let (name, extent, properties, points) = decode_single_layer_single_feature(&bytes);

		assert_eq!(name, "contours");
		assert_eq!(extent, 4096);
		assert_eq!(properties, vec![("ele".to_string(), PropertyValue::Double(100.0)), ("level".to_string(), PropertyValue::Int(2))]);
		assert_eq!(points, vec![10, 10, 20, 10, 20, 20]);
	}

	#[test]
	fn empty_layers_yield_zero_bytes() { assert_eq!(encode_tile(&[]), Vec::<u8>::new()) }

	#[test]
	fn duplicate_properties_share_one_table_entry() {
		let make_feature = |line: Vec<i64>| Feature {
			properties: vec![("ele".into(), PropertyValue::Double(10.0))],
			geom_type: GeomType::LineString,
			lines: vec![line],
		};
		let layer =
			Layer { name: "c".into(), extent: 4096, features: vec![make_feature(vec![0, 0, 1, 1]), make_feature(vec![2, 2, 3, 3])] };

		let bytes = encode_tile(&[layer]);
		// Both features use the same key and value, so the layer's key and
		// value tables should each hold exactly one entry. Count field-3
		// (keys) and field-4 (values) top-level occurrences directly.
		let mut pos = 0;
		let _tile_tag = read_varint(&bytes, &mut pos);
		let len = read_varint(&bytes, &mut pos) as usize;
		let layer_bytes = &bytes[pos..pos + len];
		let mut p = 0;
		let (mut key_count, mut value_count) = (0, 0);
		while p < layer_bytes.len() {
			let tag = read_varint(layer_bytes, &mut p);
			let field = tag >> 3;
			let l = read_varint(layer_bytes, &mut p) as usize;
			if field == 3 {
				key_count += 1;
			} else if field == 4 {
				value_count += 1;
			}
			if tag & 0x7 == 2 {
				p += l;
			}
		}
		assert_eq!(key_count, 1);
		assert_eq!(value_count, 1);
	}
}
