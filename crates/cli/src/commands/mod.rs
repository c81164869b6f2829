pub mod access;
pub mod config_cmd;
pub mod extract;
