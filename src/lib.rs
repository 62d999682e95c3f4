pub mod common;
pub mod remote;
pub mod server;
pub mod transfer;
pub mod utils;
