pub mod core;
pub mod index;
pub mod llm;
pub mod rag;
pub mod server;
pub mod state;
pub mod store;
pub mod web;
