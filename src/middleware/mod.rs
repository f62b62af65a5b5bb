//! Outermost request boundary.
//!
//! [`panic_response`] is installed through `tower-http`'s `CatchPanicLayer`
//! so a defect in request handling is logged and answered with the generic
//! 500 body instead of tearing down the connection.

use std::any::Any;

use axum::response::Response;

use crate::proxy::failure::internal_error_response;

#[allow(clippy::needless_pass_by_value)]
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    tracing::error!(failure = "internal", panic = %detail, "request handler panicked");
    internal_error_response()
}
