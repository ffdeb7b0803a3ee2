//! Decoding and addressing of raster digital elevation models.
//!
//! This crate covers the leaf of the contour pipeline: turning a decoded
//! RGBA raster into meters ([`decode`]), the resulting dense grid
//! ([`DemTile`]), and the tiled web-mercator coordinate system tiles are
//! addressed in ([`TileKey`]). Composing DEM tiles into a continuous height
//! field and tracing contours through them lives in the `contour` crate.

mod decode;
mod dem_tile;
mod error;
mod tile_key;

pub use decode::{decode_raster, Encoding};
pub use dem_tile::{DemTile, VALID_ELEVATION_RANGE};
pub use error::DemError;
pub use tile_key::TileKey;
