use thiserror::Error;

use crate::cache::Cancelable;

/// Errors produced by the cache and tile pipeline. See §7.
#[derive(Debug, Clone, Error)]
pub enum ContourError {
	#[error("fetch failed: {reason}")]
	FetchFailed { reason: String },
	#[error("decode failed: {reason}")]
	DecodeFailed { reason: String },
	#[error("timed out")]
	TimedOut,
	#[error("canceled")]
	Canceled,
	#[error("invalid input: {which}")]
	InvalidInput { which: String },
}

impl Cancelable for ContourError {
	fn canceled() -> Self { ContourError::Canceled }
}

impl From<dem::DemError> for ContourError {
	fn from(e: dem::DemError) -> Self { ContourError::DecodeFailed { reason: e.to_string() } }
}

impl From<crate::height_tile::HeightTileError> for ContourError {
	fn from(e: crate::height_tile::HeightTileError) -> Self { ContourError::InvalidInput { which: e.to_string() } }
}
