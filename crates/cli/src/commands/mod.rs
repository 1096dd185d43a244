pub mod chat;
pub mod config_cmd;
pub mod event;
pub mod once;
pub mod run;
pub mod setup;
