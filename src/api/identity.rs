use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use ulid::Ulid;

use crate::model::{Actor, Role};

use super::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Caller identity, as forwarded by the upstream identity gateway.
///
/// The headers are trusted. Authentication happens before requests reach
/// this service; only ownership is enforced here.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Actor);

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized(format!("missing {name} header")))
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id: Ulid = header(parts, USER_ID_HEADER)?
            .parse()
            .map_err(|_| ApiError::unauthorized(format!("{USER_ID_HEADER} must be a ULID")))?;
        let role: Role = header(parts, USER_ROLE_HEADER)?.parse().map_err(ApiError::unauthorized)?;
        Ok(Caller(Actor { user_id, role }))
    }
}
