pub mod constants;
pub mod engine;
pub mod error;
pub mod ev_factory;
pub mod forecast;
pub mod leaderboard;
pub mod rng;
pub mod server_protocol;
pub mod server_utils;
pub mod types;
