pub mod apis;
pub mod config;
pub mod credentials;
pub mod groups;
pub mod period;
pub mod table;
pub mod tools;
pub mod utils;
