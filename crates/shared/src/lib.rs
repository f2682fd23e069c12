pub mod api;
pub mod validate;

pub use api::*;
pub use validate::{normalize_email, Validate, ValidationError};
