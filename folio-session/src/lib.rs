pub mod gateways;
pub mod persistence;
pub mod session;
pub mod staged;
