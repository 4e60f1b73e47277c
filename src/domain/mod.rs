pub mod error;
pub mod hub;
pub mod llm_config;
pub mod records;
