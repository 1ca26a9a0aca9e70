pub mod adversary;
pub mod common;
pub mod config;
pub mod contracts;
pub mod error;
pub mod events;
pub mod logger;
pub mod migration;
pub mod monitoring;
pub mod power_model;
pub mod resource_pool;
pub mod scheduler;
pub mod selector;
pub mod strategies;
pub mod strategy;
pub mod transaction;
pub mod vm;
pub mod vm_registry;
