//! Database connection lifecycle manager for the application server.
//!
//! Application code obtains a ready pool from [`db::ConnectionManager`];
//! operators read diagnostics and steer the pool monitor over HTTP.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod routes;
pub mod shutdown;
