//! External collaborator interfaces (§6): tile fetch and raster decode are
//! out of scope for this crate and are supplied by the embedding
//! application.

use dem::Encoding;
use futures::future::BoxFuture;

use crate::{cancel::CancelSignal, error::ContourError};

pub struct FetchResponse {
	pub bytes: Vec<u8>,
	pub expires_secs: Option<u64>,
	pub cache_control: Option<String>,
}

/// Retrieves the raw bytes for a tile URL. Implementations own their own
/// transport (HTTP client, archive reader, ...) and are responsible for
/// enforcing the configured `timeoutMs` themselves, firing `cancel` and
/// returning [`ContourError::TimedOut`] on expiry (§5 "Timeouts").
pub trait Fetcher: Send + Sync {
	fn fetch(&self, url: String, cancel: CancelSignal) -> BoxFuture<'static, Result<FetchResponse, ContourError>>;
}

/// Decodes fetched bytes (typically a PNG/WebP raster) into a row-major
/// elevation grid.
pub trait Decoder: Send + Sync {
	fn decode(&self, bytes: Vec<u8>, encoding: Encoding, cancel: CancelSignal) -> BoxFuture<'static, Result<dem::DemTile, ContourError>>;
}
