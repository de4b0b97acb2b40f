//! Topic naming shared by requesters, the dispatcher and event consumers.

pub const REQUEST_PREFIX: &str = "requests";
pub const RESPONSE_PREFIX: &str = "responses";
pub const EVENT_PREFIX: &str = "orders";

/// Filter the dispatcher subscribes with
pub const REQUEST_WILDCARD: &str = "requests/#";

/// Routing hints carried by a request topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTopic {
    /// Last segment of the topic
    pub action: String,
    /// Second segment of `requests/{platform}/{action}`
    pub platform: Option<String>,
}

/// Split a request topic into its routing hints.
///
/// Returns `None` for topics with fewer than two segments.
pub fn parse_request_topic(topic: &str) -> Option<RequestTopic> {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() < 2 {
        return None;
    }

    let action = parts[parts.len() - 1].to_string();
    let platform = if parts.len() >= 3 && parts[0] == REQUEST_PREFIX {
        Some(parts[1].to_string())
    } else {
        None
    };

    Some(RequestTopic { action, platform })
}

/// `requests/{action}` or `requests/{platform}/{action}`
pub fn request_topic(platform: Option<&str>, action: &str) -> String {
    match platform.filter(|p| !p.is_empty()) {
        Some(platform) => format!("{}/{}/{}", REQUEST_PREFIX, platform, action),
        None => format!("{}/{}", REQUEST_PREFIX, action),
    }
}

/// `responses/{request_id}`
pub fn response_topic(request_id: &str) -> String {
    format!("{}/{}", RESPONSE_PREFIX, request_id)
}

/// `orders/{event_type}`
pub fn event_topic(event_type: &str) -> String {
    format!("{}/{}", EVENT_PREFIX, event_type)
}

/// Event type from an `orders/{event_type}` topic
pub fn parse_event_topic(topic: &str) -> Option<&str> {
    match topic.split_once('/') {
        Some((EVENT_PREFIX, event_type)) if !event_type.is_empty() && !event_type.contains('/') => {
            Some(event_type)
        }
        _ => None,
    }
}
