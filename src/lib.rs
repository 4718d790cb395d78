pub mod collector;
pub mod commands;
pub mod config;
pub mod error_utils;
pub mod storage;
pub mod vk;
