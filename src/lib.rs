pub mod config;
pub mod fnsign;
