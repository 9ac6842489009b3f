//! API route modules.

pub mod events;
pub mod health;
pub mod recording;
pub mod tasks;

use std::str::FromStr;

use crate::api::error::{ApiError, ApiResult};

/// Parse a path or body identifier, rejecting malformed input with 400.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> ApiResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid {what}: {raw:?}")))
}
