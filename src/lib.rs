// lib.rs
//
// 星辰旅人 QQ 机器人：OneBot v11 适配 + 插件流水线

pub mod log;

pub mod adapters;
pub mod command;
pub mod config;
pub mod event;
pub mod fetch;
pub mod matcher;
pub mod message;
pub mod permission;
pub mod plugins;
pub mod scheduler;
pub mod whitelist;
