//! Standard middlewares: schema validation and zone-based routing.

pub mod validation;
pub mod zone;

pub use validation::MessageValidator;
pub use zone::{zone_visibility_filter, ZoneBasedRouter, VISIBLE_ZONES_PARAMETER};
