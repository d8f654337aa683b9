//! The DNS side of Landns: record model, resolver pipeline and servers.

pub mod dynamic;
pub mod forward;
pub mod local_cache;
pub mod message;
pub mod record;
pub mod redis_cache;
pub mod resolver;
pub mod server;
pub mod sqlite;
pub mod static_zone;
