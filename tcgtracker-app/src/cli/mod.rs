pub mod commands;
pub mod exchange;
pub mod opts;
