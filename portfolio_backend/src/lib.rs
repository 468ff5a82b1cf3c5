pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod client;
pub mod comments;
pub mod config;
pub mod contacts;
pub mod error;
pub mod node;
pub mod ownership;
pub mod sanitize;
pub mod site;
pub mod store;
pub mod telemetry;
pub mod utils;
