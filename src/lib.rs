pub mod auth;
pub mod client;
pub mod conversation;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod websocket;
