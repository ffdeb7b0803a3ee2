//! Single-pass marching-squares isoline tracer (§4.3).
//!
//! Traces contours for *every* elevation threshold in one sweep of the
//! grid, keeping a per-threshold index of open polyline fragments keyed by
//! packed grid-edge ids so fragments started in one cell can be joined to
//! fragments finished in a neighboring cell without a second pass.

use std::collections::{BTreeMap, HashMap};

use crate::height_tile::HeightTile;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Edge {
	Left,
	Top,
	Right,
	Bottom,
}

impl Edge {
	/// `(dx, dy)` offset of this edge's midpoint within a cell, doubled so
	/// half-integer positions are exact. See §4.3 step 4.
	fn offset(self) -> (i64, i64) {
		match self {
			Edge::Left => (0, 1),
			Edge::Top => (1, 0),
			Edge::Right => (2, 1),
			Edge::Bottom => (1, 2),
		}
	}
}

/// Case table keyed by `tl*8 | tr*4 | br*2 | bl*1`. Entries are
/// `(start_edge, end_edge)` pairs for each line segment the cell
/// contributes. Cases 5 and 10 are the ambiguous saddles: each resolves to
/// two unconnected arcs, one around each high corner, rather than
/// connecting the diagonal — this resolution must match byte for byte
/// across implementations (§4.3 "Case-table ties").
const CASE_TABLE: [&[(Edge, Edge)]; 16] = {
	use Edge::*;
	[
		&[],                         // 0000
		&[(Bottom, Left)],           // 0001 bl
		&[(Right, Bottom)],          // 0010 br
		&[(Right, Left)],            // 0011 bl,br
		&[(Top, Right)],             // 0100 tr
		&[(Top, Right), (Bottom, Left)], // 0101 tr,bl (saddle)
		&[(Top, Bottom)],            // 0110 tr,br
		&[(Top, Left)],              // 0111 tr,bl,br
		&[(Left, Top)],              // 1000 tl
		&[(Bottom, Top)],            // 1001 tl,bl
		&[(Left, Top), (Right, Bottom)], // 1010 tl,br (saddle)
		&[(Right, Top)],             // 1011 tl,bl,br
		&[(Left, Right)],            // 1100 tl,tr
		&[(Bottom, Right)],          // 1101 tl,tr,bl
		&[(Left, Bottom)],           // 1110 tl,tr,br
		&[],                         // 1111
	]
};

#[inline]
fn classify(tl: f64, tr: f64, br: f64, bl: f64, t: f64) -> usize {
	(usize::from(tl > t) << 3) | (usize::from(tr > t) << 2) | (usize::from(br > t) << 1) | usize::from(bl > t)
}

/// Cell-space crossing point and packed edge id for one edge of the cell
/// whose top-left corner is grid vertex `(c - 1, r - 1)`.
fn edge_crossing(edge: Edge, c: i64, r: i64, tl: f64, tr: f64, bl: f64, br: f64, t: f64, width: i64) -> (i64, (f64, f64)) {
	let (x0, y0) = (c - 1, r - 1);
	let point = match edge {
		Edge::Top => (x0 as f64 + frac(tl, tr, t), y0 as f64),
		Edge::Right => (x0 as f64 + 1.0, y0 as f64 + frac(tr, br, t)),
		Edge::Bottom => (x0 as f64 + frac(bl, br, t), y0 as f64 + 1.0),
		Edge::Left => (x0 as f64, y0 as f64 + frac(tl, bl, t)),
	};
	let (dx, dy) = edge.offset();
	let id = (x0 * 2 + dx) + (y0 * 2 + dy) * (width + 1) * 2;
	(id, point)
}

#[inline]
fn frac(a: f64, b: f64, t: f64) -> f64 { (t - a) / (b - a) }

#[inline]
fn round_half_away_from_zero(x: f64) -> i64 {
	if x >= 0.0 {
		(x + 0.5).floor() as i64
	} else {
		(x - 0.5).ceil() as i64
	}
}

struct Fragment {
	start_id: i64,
	end_id: i64,
	points: Vec<(f64, f64)>,
}

/// Open-fragment index for a single elevation threshold.
#[derive(Default)]
struct ThresholdTracer {
	fragments: Vec<Option<Fragment>>,
	by_end: HashMap<i64, usize>,
	by_start: HashMap<i64, usize>,
}

impl ThresholdTracer {
	fn add_segment(&mut self, s_id: i64, s: (f64, f64), e_id: i64, e: (f64, f64)) {
		if let Some(idx) = self.by_end.remove(&s_id) {
			let frag = self.fragments[idx].as_mut().expect("fragment slot must be live");
			frag.points.push(e);
			frag.end_id = e_id;

			if let Some(idx2) = self.by_start.remove(&e_id) {
				if idx2 == idx {
					// Ring closure: last point now equals the first; leave
					// it in `fragments` (no longer reachable via either
					// map) to be emitted as-is by `finish`.
				} else {
					let other = self.fragments[idx2].take().expect("fragment slot must be live");
					let frag = self.fragments[idx].as_mut().expect("fragment slot must be live");
					frag.points.extend(other.points.into_iter().skip(1));
					frag.end_id = other.end_id;
					self.by_end.insert(other.end_id, idx);
				}
			} else {
				self.by_end.insert(e_id, idx);
			}
		} else if let Some(idx) = self.by_start.remove(&e_id) {
			let frag = self.fragments[idx].as_mut().expect("fragment slot must be live");
			frag.points.insert(0, s);
			frag.start_id = s_id;
			self.by_start.insert(s_id, idx);
		} else {
			let idx = self.fragments.len();
			self.fragments.push(Some(Fragment { start_id: s_id, end_id: e_id, points: vec![s, e] }));
			self.by_start.insert(s_id, idx);
			self.by_end.insert(e_id, idx);
		}
	}

	fn finish(self) -> Vec<Vec<(f64, f64)>> {
		self.fragments
			.into_iter()
			.flatten()
			.filter(|f| f.points.len() >= 2)
			.map(|f| f.points)
			.collect()
	}
}

/// Trace isolines for every multiple of `interval` through `tile`, a
/// pixel-corner ("grid-aligned") height field. `extent` is the MVT
/// coordinate scale; `buffer` extends the scan into the tile's margin by
/// that many cells so lines continue smoothly across tile seams.
///
/// Returns threshold (as a multiple of `interval`, i.e. `elevation /
/// interval`) mapped to its polylines, each a flat `[x0, y0, x1, y1, ...]`
/// sequence of rounded integer MVT coordinates.
pub fn trace(tile: &HeightTile, interval: f64, extent: u32, buffer: i64) -> BTreeMap<i64, Vec<Vec<i64>>> {
	let width = tile.width();
	let height = tile.height();
	if width < 2 || height < 2 || interval <= 0.0 {
		return BTreeMap::new();
	}

	let mul = extent as f64 / (width - 1) as f64;
	let mut by_threshold: HashMap<i64, ThresholdTracer> = HashMap::new();

	for r in (1 - buffer)..(height + buffer) {
		for c in (1 - buffer)..(width + buffer) {
			let tl = tile.sample(c - 1, r - 1);
			let tr = tile.sample(c, r - 1);
			let bl = tile.sample(c - 1, r);
			let br = tile.sample(c, r);
			if tl.is_nan() || tr.is_nan() || bl.is_nan() || br.is_nan() {
				continue;
			}
			let (tl, tr, bl, br) = (tl as f64, tr as f64, bl as f64, br as f64);

			let min = tl.min(tr).min(bl).min(br);
			let max = tl.max(tr).max(bl).max(br);
			let k_min = (min / interval).ceil() as i64;
			let k_max = (max / interval).floor() as i64;

			for k in k_min..=k_max {
				let t = k as f64 * interval;
				let case = classify(tl, tr, br, bl, t);
				for &(start_edge, end_edge) in CASE_TABLE[case] {
					let (s_id, s) = edge_crossing(start_edge, c, r, tl, tr, bl, br, t, width);
					let (e_id, e) = edge_crossing(end_edge, c, r, tl, tr, bl, br, t, width);
					by_threshold.entry(k).or_default().add_segment(s_id, s, e_id, e);
				}
			}
		}
	}

	let mut out = BTreeMap::new();
	for (k, tracer) in by_threshold {
		let polylines: Vec<Vec<i64>> = tracer
			.finish()
			.into_iter()
			.map(|points| {
				points
					.into_iter()
					.flat_map(|(x, y)| [round_half_away_from_zero(x * mul), round_half_away_from_zero(y * mul)])
					.collect()
			})
			.filter(|pts: &Vec<i64>| pts.len() >= 4)
			.collect();
		if !polylines.is_empty() {
			out.insert(k, polylines);
		}
	}
	out
}
