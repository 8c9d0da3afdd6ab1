//! # pagetree
//!
//! The application layer around `pagetree-core`: configuration, the HTTP
//! JSON API and the command line interface.

pub mod api;
pub mod cli;
pub mod config;
