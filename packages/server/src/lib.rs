//! Hiroba chat server.
//!
//! Clients connect over TCP, log in, join a password-protected group and chat with
//! the other members. Sessions are spread over a small set of worker threads;
//! persistence goes through a bounded connection pool.

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
