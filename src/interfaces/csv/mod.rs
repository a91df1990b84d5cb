pub mod log_writer;
pub mod wallet_writer;
