//! Fleetdesk Kernel Library
//!
//! Listing engine, tree fetchers, registered entity listings and the HTTP
//! surface that serves them. The main entry point for running the server is
//! the `fleetdesk` binary.

pub mod config;
pub mod error;
pub mod listing;
pub mod listings;
pub mod routes;
pub mod state;
pub mod store;
