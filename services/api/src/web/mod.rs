pub mod admin;
pub mod auth;
pub mod form;
pub mod middleware;
pub mod reply;
pub mod resident;
pub mod rest;
pub mod router;
pub mod state;

// Re-export the pieces the binaries need to build and document the server.
pub use middleware::{require_admin, require_auth};
pub use rest::ApiDoc;
pub use router::build_router;
pub use state::AppState;
