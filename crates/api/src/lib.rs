//! HTTP API: server, routing, and request/response mapping for the ledger engine.

pub mod app;
