//! guildscribe: records scheduled guild voice meetings and tracks portfolio tasks.

pub mod api;
pub mod app;
pub mod calendar;
pub mod cli;
pub mod config;
pub mod db;
pub mod discord;
pub mod global;
pub mod notify;
pub mod paging;
pub mod reconciler;
pub mod recorder;
pub mod reminder;
pub mod tasks;
