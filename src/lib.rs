//! Library crate for nmap-form-rs: scan option resolution, result normalization
//! and the collaborators around them.
pub mod engine;
pub mod normalize;
pub mod render;
pub mod resolver;
pub mod server;
pub mod types;
