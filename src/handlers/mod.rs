//! Request handlers registered with the [`Dispatcher`].
//!
//! Each handler authorizes the caller, calls the upstream API and runs the
//! field mapper, reporting every failure inside the response envelope.

pub mod auth;
pub mod api_request;
pub mod create_product;

use std::sync::Arc;

pub use auth::{AuthError, AuthService};
pub use api_request::ApiRequestHandler;
pub use create_product::CreateProductHandler;

use crate::mapping::{FieldMapper, DEFAULT_PLATFORM};
use crate::rpc::{Dispatcher, RequestEnvelope};
use crate::upstream::UpstreamApi;

pub const API_REQUEST_ACTION: &str = "api_request";
pub const CREATE_PRODUCT_ACTION: &str = "create_product";

/// Platform used for mapping: the envelope's `platform`, else
/// `params.platform`, else `"default"`; trimmed and lower-cased.
pub fn resolve_platform_id(request: &RequestEnvelope) -> String {
    let platform = request.platform.trim();
    if !platform.is_empty() {
        return platform.to_lowercase();
    }

    request
        .param_str("platform")
        .map(|p| p.trim().to_lowercase())
        .unwrap_or_else(|| DEFAULT_PLATFORM.to_string())
}

/// Register the built-in handlers
pub fn register_handlers(
    dispatcher: &mut Dispatcher,
    auth: Arc<AuthService>,
    upstream: Arc<dyn UpstreamApi>,
    mapper: Arc<FieldMapper>,
) {
    dispatcher.register_handler(
        API_REQUEST_ACTION,
        Arc::new(ApiRequestHandler::new(auth.clone(), upstream.clone(), mapper.clone())),
    );
    dispatcher.register_handler(
        CREATE_PRODUCT_ACTION,
        Arc::new(CreateProductHandler::new(auth, upstream, mapper)),
    );
}
