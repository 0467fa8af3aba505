pub mod agent;
pub mod config;
pub mod db;
pub mod tools;
pub mod types;

pub use types::*;
