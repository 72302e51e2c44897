pub mod config_cmd;
pub mod init;
pub mod pricing;
pub mod show;
pub mod summary;
