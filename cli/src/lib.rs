pub mod api;
pub mod app;
pub mod audio;
pub mod backend;
pub mod config;
pub mod mock;
pub mod plan;
pub mod planner;
pub mod render;
pub mod selections;
pub mod types;
pub mod ui;
pub mod wizard;
