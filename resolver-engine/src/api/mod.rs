//! HTTP trigger surface
//!
//! Thin REST layer over the orchestrators: batch runs, single-record
//! resolution and health. All state lives in the database; the only
//! in-process state is the run registry used to answer status queries.

pub mod batch;
pub mod health;
pub mod resolve;

pub use batch::batch_routes;
pub use health::health_routes;
pub use resolve::resolve_routes;
