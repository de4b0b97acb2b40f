//! # Shopbridge: Commerce Platform Adapter
//!
//! Shopbridge sits between internal services and an external commerce
//! platform. It answers request/response calls carried over a message bus,
//! translating field names and value formats between the canonical schema
//! and each platform's schema with database-driven mapping rules.
//!
//! ## Features
//!
//! - **Field mapping**: dot-path rules (`variants.0.price`) with named value transforms
//!   and their inverses
//! - **Request dispatch**: `requests/{action}` in, `responses/{request_id}` out, with
//!   typed error codes
//! - **Handlers**: authenticated `api_request` proxy and `create_product` with reverse mapping
//! - **Webhook ingestion**: HMAC-verified notifications mapped and published to
//!   `orders/{event_type}`
//! - **Stores**: PostgreSQL via Diesel (feature: `postgres`) or an in-memory store seeded from YAML
//!
//! ## Example: Mapping rules
//!
//! ```yaml
//! mappings:
//!   - platform_id: shopee
//!     entity_type: product
//!     source_field: title
//!     target_field: name
//!   - platform_id: shopee
//!     entity_type: product
//!     source_field: variants.0.price
//!     target_field: price_cents
//!     transform: dollars_to_cents
//! ```
//!
//! A request published to `requests/shopee/api_request`:
//!
//! ```json
//! {
//!   "request_id": "r-1",
//!   "api_key": "svc-key",
//!   "shop_id": "42",
//!   "params": {"path": "/sellers/42/products", "entity_type": "product", "entity_key": "products"}
//! }
//! ```
//!
//! is answered on `responses/r-1` with every product mapped into the
//! platform's schema.

// Mapping engine
pub mod transform_registry;
pub mod mapping;

// Request/response protocol and handlers
pub mod rpc;
pub mod handlers;

// Transports and external systems
pub mod bus;
pub mod events;
pub mod upstream;
pub mod store;

// Process surface
pub mod config;
pub mod http;

// Re-export key types
pub use transform_registry::{Inverse, TransformFn, TransformRegistry};
pub use mapping::{FieldMapper, FieldPath, MapperError, MappingCache, MappingRuleService};
pub use rpc::{Dispatcher, ErrorCode, RequestEnvelope, RequestHandler, ResponseEnvelope};
pub use handlers::{register_handlers, AuthService};
pub use bus::{BusError, InboundMessage, MemoryBus, NatsBus, NatsConfig, Publisher};
pub use events::{EventMessage, WebhookService};
pub use upstream::{PlatformClient, UpstreamApi, UpstreamConfig, UpstreamError};
pub use store::{MappingRule, MemoryStore, StoreError};
pub use config::{AdapterConfig, ConfigError, StoreBackend};

#[cfg(feature = "postgres")]
pub use store::{Database, PgStore};
