pub mod agent;
pub mod config;
pub mod dialogue;
pub mod extract;
pub mod gateway;
pub mod mood;
pub mod phrases;
pub mod store;
pub mod types;
