pub mod api;
pub mod app;
pub mod backend;
pub mod config;
pub mod error;
pub mod models;
pub mod state;
pub mod upload;
pub mod view;
