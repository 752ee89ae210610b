pub mod cli;
pub mod commands;
pub mod error;
pub mod frames;
pub mod logging;
pub mod output;
