pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod cors;
pub mod error;
pub mod hub;
pub mod monitor;
pub mod presence;
pub mod session;
pub mod state;
pub mod ws;
