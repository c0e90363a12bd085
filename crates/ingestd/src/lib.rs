pub mod admission;
pub mod config;
pub mod consumer;
pub mod knowledge;
pub mod loaders;
pub mod processor;
pub mod reaper;
