// src/routes/mod.rs
pub mod change_routes;
