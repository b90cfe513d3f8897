pub mod api;
pub mod config;
pub mod hub;
pub mod humanize;
pub mod jobs;
pub mod observability;
pub mod relay;
pub mod resolver;
pub mod service;
pub mod tools;
pub mod transcode;
pub mod worker;
