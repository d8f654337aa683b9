//! Landns
//!
//! An authoritative plus recursive DNS server for small networks, with a
//! live-editable record store behind an HTTP control plane. Queries flow
//! through a composed resolver tree: static zones and the dynamic zone are
//! tried first, recursion through upstream servers (optionally cached
//! locally or in Redis) fills in the rest.

pub mod bootstrap;
pub mod config;
pub mod dns;
pub mod error;
pub mod log;
pub mod metrics;
pub mod web;
