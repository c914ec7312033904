#[macro_use]
extern crate tracing;

pub mod admission;
pub mod config;
pub mod injector;
pub mod patch;
pub mod render;
pub mod server;
pub mod store;

pub mod built_info {
    pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
    pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
}
