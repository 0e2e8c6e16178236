pub mod access;
pub mod auth;
pub mod captcha;
pub mod config;
pub mod db;
pub mod documents;
pub mod error;
pub mod models;
pub mod popularity;
pub mod reactions;
pub mod render;
pub mod routes;
pub mod s3;
pub mod schema;
pub mod state;
pub mod storage;
pub mod utils;
