use super::state::ServerState;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::IntoResponse,
};
use tracing::debug;

/// Identity of the caller, as asserted by the upstream identity service.
#[derive(Debug)]
pub struct Session {
    pub user_id: String,
}

impl Session {
    pub fn owns(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

pub const HEADER_USER_ID_KEY: &str = "X-User-Id";

pub enum SessionExtractionError {
    AccessDenied,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            SessionExtractionError::AccessDenied => StatusCode::FORBIDDEN.into_response(),
        }
    }
}

fn extract_session_from_request_parts(parts: &Parts) -> Option<Session> {
    let user_id = match parts.headers.get(HEADER_USER_ID_KEY) {
        None => {
            debug!("No {} header in request.", HEADER_USER_ID_KEY);
            return None;
        }
        Some(value) => value.to_str().ok()?.trim().to_owned(),
    };
    if user_id.is_empty() {
        debug!("Empty {} header in request.", HEADER_USER_ID_KEY);
        return None;
    }
    Some(Session { user_id })
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        _ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        extract_session_from_request_parts(parts).ok_or(SessionExtractionError::AccessDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/v1/reviews");
        if let Some(value) = header {
            builder = builder.header(HEADER_USER_ID_KEY, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn reads_user_from_header() {
        let session = extract_session_from_request_parts(&parts_with(Some(" alice "))).unwrap();
        assert_eq!(session.user_id, "alice");
        assert!(session.owns("alice"));
        assert!(!session.owns("bob"));
    }

    #[test]
    fn missing_or_blank_header_is_rejected() {
        assert!(extract_session_from_request_parts(&parts_with(None)).is_none());
        assert!(extract_session_from_request_parts(&parts_with(Some("   "))).is_none());
    }
}
