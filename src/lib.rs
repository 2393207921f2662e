pub mod config;
pub mod humanize;
pub mod manifest;
pub mod observability;
pub mod os;
pub mod registry;
pub mod service;
