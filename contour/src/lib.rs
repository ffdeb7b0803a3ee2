//! Stitches raster elevation tiles into contour vector tiles.
//!
//! Ties together `dem`'s decoded rasters with a lazy, composable height
//! field ([`height_tile`]), a single-pass marching-squares tracer
//! ([`tracer`]), an MVT encoder ([`mvt`]), and a deduplicating async cache
//! ([`cache`]) behind one entry point:
//! [`pipeline::ContourPipeline::fetch_contour_tile`].

pub mod cache;
pub mod cancel;
pub mod error;
pub mod external;
pub mod height_tile;
pub mod mvt;
pub mod options;
pub mod pipeline;
pub mod tracer;

pub use cancel::CancelSignal;
pub use error::ContourError;
pub use external::{Decoder, FetchResponse, Fetcher};
pub use height_tile::HeightTile;
pub use options::{ContourOptions, GlobalContourOptions};
pub use pipeline::{ContourPipeline, PipelineConfig};
