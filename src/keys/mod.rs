//! Ephemeral key model, parsing, and the refresh decision.

pub mod models;
pub mod parser;
pub mod policy;

pub use models::{AssociatedObject, EphemeralKey, CUSTOMER_OBJECT_TYPE, ISSUING_CARD_OBJECT_TYPE};
pub use parser::parse_ephemeral_key;
pub use policy::should_refresh;
