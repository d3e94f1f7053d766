mod candidate;
mod error;
mod status;
mod strike;

pub use candidate::*;
pub use error::*;
pub use status::*;
pub use strike::*;
