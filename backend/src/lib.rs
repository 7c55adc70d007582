pub mod chatbot;
pub mod config;
pub mod inference;
pub mod report;
pub mod routes;
pub mod session;
pub mod storage;
pub mod views;
