// src/lib.rs

pub mod api;
pub mod app_state;
pub mod blob;
pub mod config;
pub mod error;
pub mod grpc;
pub mod metadata;
pub mod service;
