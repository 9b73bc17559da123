#![forbid(unsafe_code)]

pub mod api;
pub mod app;
pub mod authenticator;
pub mod authorizer;
pub mod config;
pub mod error;
pub mod front_door;
pub mod models;
pub mod observability;
pub mod repository;
pub mod runtime;
pub mod stash;
pub mod token;
