//! Lectern presentation engagement server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod feedback;
pub mod presentations;
pub mod quiz;
pub mod roles;
pub mod routes;
pub mod session;
pub mod state;
pub mod ws;
