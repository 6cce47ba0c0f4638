pub mod config;
pub mod database;
pub mod deferred;
pub mod entities;
pub mod errors;
pub mod models;
pub mod normalization;
pub mod observability;
pub mod repositories;
pub mod services;
pub mod sources;
pub mod utils;
