pub mod cors;
pub mod negotiation;
pub mod request_id;
