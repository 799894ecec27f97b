pub mod counterparty;
pub mod field;
pub mod negotiation;
