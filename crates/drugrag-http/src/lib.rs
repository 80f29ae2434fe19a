//! DrugRAG HTTP Server
//!
//! Exposes the query pipeline as `POST /query` plus liveness and readiness
//! probes.

mod error;
mod routes;
mod server;

pub use error::ApiError;
pub use routes::{QueryRequest, QueryResponse};
pub use server::{router, start_server, AppState};
