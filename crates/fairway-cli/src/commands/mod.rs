pub mod auth_cmd;
pub mod common;
pub mod completions;
pub mod config;
pub mod courses;
pub mod stats;
pub mod suggest;
pub mod sync;
pub mod visits;
pub mod wishlist;
