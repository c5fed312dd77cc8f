pub mod banner;
pub mod bridge;
pub mod commands;
pub mod config;
pub mod consts;
pub mod engine;
pub mod error;
pub mod events;
pub mod protocol;
pub mod spinner;
pub mod view;
