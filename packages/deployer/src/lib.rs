pub mod archive;
pub mod config;
pub mod database;
pub mod drop;
pub mod entity;
pub mod error;
pub mod executor;
pub mod logs;
pub mod lookup;
pub mod models;
pub mod patch;
pub mod repo;
pub mod services;
