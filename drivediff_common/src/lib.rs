pub mod access;
pub mod cancel;
pub mod config;
pub mod error;
pub mod types;

pub use access::*;
pub use cancel::*;
pub use config::*;
pub use error::*;
pub use types::*;
