//! HTTP transport for the procurement API the wizards talk to.

pub mod client;
pub mod response;

pub use client::{GatewayError, HttpProcurementApi};
pub use response::extract_error_message;
