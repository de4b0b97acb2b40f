//! Request/response protocol over the message bus.
//!
//! Callers publish a [`RequestEnvelope`] to `requests/{action}` or
//! `requests/{platform}/{action}`; the [`Dispatcher`] answers on
//! `responses/{request_id}`.

pub mod envelope;
pub mod topics;
pub mod dispatcher;

pub use envelope::{ErrorCode, ErrorDetail, RequestEnvelope, ResponseEnvelope};
pub use topics::{
    event_topic, parse_event_topic, parse_request_topic, request_topic, response_topic,
    RequestTopic, REQUEST_WILDCARD,
};
pub use dispatcher::{Dispatcher, RequestHandler};
