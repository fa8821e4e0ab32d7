pub mod app;
pub mod config;
pub mod desktop;
pub mod timer;
