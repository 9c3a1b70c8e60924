pub mod admission;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod output;
pub mod registry;
pub mod state;
