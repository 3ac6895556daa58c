pub mod auth;
pub mod config;
pub mod conflict;
pub mod db;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod pagination;
pub mod routes;
pub mod services;
pub mod store;
