//! PostgreSQL persistence for breeding plans: connection config, pooling,
//! embedded migrations, row models and tenant-scoped queries.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
