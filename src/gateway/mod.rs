pub mod auth;
pub mod server;

pub use server::{AppState, router, run};
