pub mod assets;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod stages;
pub mod status;

pub use routes::create_router;
