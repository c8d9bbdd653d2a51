pub mod access;
pub mod backend;
pub mod client;
pub mod cmd;
pub mod db;
pub mod types;
pub mod utils;
