//! Capability providers shipped with the launch kit

pub mod network_operator;

pub use network_operator::NetworkOperatorProvider;
