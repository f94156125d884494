pub mod error;
pub mod extraction;
pub mod gemini;
pub mod models;
pub mod service;
pub mod store;
