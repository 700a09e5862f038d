//! `pixelmint-api` — HTTP submission boundary and service wiring.

pub mod app;
