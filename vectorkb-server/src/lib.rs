pub mod aws;
pub mod http;
pub mod subsystems;
