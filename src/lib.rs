// Clippy allows for reasonable defaults
#![allow(clippy::too_many_arguments)] // Orchestration helpers carry several params
#![allow(clippy::new_without_default)] // Default not always appropriate for stateful types

// Module declarations
pub mod cms;
pub mod crypto;
pub mod models;
pub mod retention;
pub mod scheduler;
pub mod storage;
pub mod sweep;
pub mod validation;

// Server module (HTTP API)
pub mod server;
