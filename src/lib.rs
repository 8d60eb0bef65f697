// src/lib.rs
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod market;
pub mod market_client;
pub mod models;
pub mod paging;
pub mod portfolio;
pub mod watchlist;
