mod server;

pub mod routes;
pub mod state;

// Public API for starting the webserver
pub use server::start_server;
