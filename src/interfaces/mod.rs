pub mod commands;
pub mod csv;
