pub mod clock;
pub mod config;
pub mod format;
pub mod models;
pub mod services;
pub mod storage;
pub mod validation;
pub mod views;
pub mod workspace;
