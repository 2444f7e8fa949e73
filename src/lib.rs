pub mod config;
pub mod contexts;
pub mod data;
pub mod error;
pub mod postprocess;
pub mod registries;
pub mod render;
pub mod server;
pub mod spec_parser;
