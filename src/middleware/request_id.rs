//! Request ID middleware
//!
//! A caller-supplied `x-request-id` is kept; otherwise a v4 UUID is assigned.
//! Either way the id is echoed on the response so operator tooling can tie
//! a health or stats call to its trace span.

use axum::http::HeaderName;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Layer pair for `create_app`: set on the way in, propagate on the way out.
pub fn request_id_layer() -> (SetRequestIdLayer<MakeRequestUuid>, PropagateRequestIdLayer) {
    let header = HeaderName::from_static(X_REQUEST_ID);

    (
        SetRequestIdLayer::new(header.clone(), MakeRequestUuid),
        PropagateRequestIdLayer::new(header),
    )
}
