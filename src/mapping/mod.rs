//! Field mapping between the canonical schema and external platform schemas.

pub mod path;
pub mod mapper;
pub mod rules;

pub use path::{get_nested, set_nested, FieldPath, PathSegment};
pub use mapper::{FieldMapper, MapperError, MappingCache};
pub use rules::{MappingRuleService, RuleError, RuleInput, DEFAULT_PLATFORM};
