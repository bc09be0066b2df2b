//! Request handlers for the conversion gateway

pub mod convert;
pub mod health;

pub use convert::convert_router;
pub use health::health_router;
