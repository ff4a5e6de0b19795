pub mod app;
pub mod config;
pub mod cutout;
pub mod error;
pub mod events;
pub mod layout;
pub mod render;
pub mod service;
pub mod state;
pub mod surface;
pub mod tasks {
    pub mod compositor;
    pub mod inbox;
    pub mod processor;
}

pub use error::Error;
