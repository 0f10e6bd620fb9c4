//! HTTP API: routing and request/response mapping for the transfer engine.

pub mod app;
