mod endpoint_pool;
mod engine_state;
mod pending_stream;
mod watchdog;

pub use endpoint_pool::*;
pub use engine_state::*;
pub use pending_stream::*;
pub use watchdog::*;
