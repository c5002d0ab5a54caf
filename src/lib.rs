pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod pagination;
pub mod repository;
pub mod service;
pub mod wal;
