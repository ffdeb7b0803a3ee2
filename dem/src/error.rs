use thiserror::Error;

/// Errors produced while decoding or addressing elevation rasters.
#[derive(Debug, Error)]
pub enum DemError {
	#[error("raster byte length {got} does not match width*height*4 ({expected})")]
	SizeMismatch { got: usize, expected: usize },
	#[error("unknown elevation encoding {0:?}")]
	UnknownEncoding(String),
}
