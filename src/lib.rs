mod builtin;
pub mod config;
mod forth;

pub use config::Config;
pub use forth::{Cell, Forth, ForthError};
