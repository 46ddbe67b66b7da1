//! Port traits: the seams between the domain and the outside world.

pub mod artifact_port;
pub mod config_port;
pub mod market_data_port;
pub mod nav_store_port;
