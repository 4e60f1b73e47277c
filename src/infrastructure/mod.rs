#[path = "config/mod.rs"]
pub mod config_mod;
pub use config_mod as config;
pub mod graph_db;
pub mod html;
pub mod hub;
pub mod llm_clients;
pub mod pdf;
pub mod response;
pub mod storage;
pub mod vector_store;
