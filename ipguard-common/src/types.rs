mod limits;
mod secret;

pub use limits::*;
pub use secret::*;
