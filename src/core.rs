pub mod freshness;
pub mod models;
pub mod normalize;
pub mod ports;
pub mod resilience;
pub mod rules;
pub mod services;
