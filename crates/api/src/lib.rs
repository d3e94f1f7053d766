mod handlers;
mod routes;
mod state;

pub use handlers::ApiResponse;
pub use routes::{create_server, start_server};
pub use state::AppState;
