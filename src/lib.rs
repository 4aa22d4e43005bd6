//! Style Studio: sign up, upload a reference image with a prompt and a style,
//! and get back a (simulated) generation record with recent history.
//!
//! The server side is an axum app over SQLite ([`app::build_app`]); the
//! [`client`] module holds the HTTP client and the generation request
//! lifecycle a UI drives.

pub mod app;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod generations;
pub mod images;
pub mod state;
pub mod storage;
pub mod validators;
