pub mod errors;
pub mod signal;

pub use errors::*;
pub use signal::*;
