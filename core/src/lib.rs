pub mod assistant;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod generate;
pub mod judge;
pub mod matcher;
pub mod retry;
pub mod schema;
