#![feature(io_error_more)]
//! Core types shared by the Magpie loaders and storage engine.
//!
//! This crate is deliberately free of JSON and database dependencies.
//! All other crates depend on it; it depends on nothing heavier than chrono.

pub mod capture;
pub mod paths;
