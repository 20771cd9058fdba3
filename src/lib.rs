//! Distill: single-binary web scraping service for LLM consumption
//!
//! Given a URL, returns clean page content (HTML or text) with metadata,
//! link and image indexes, and timing telemetry. Built around a layered
//! fetch core:
//! - Multi-engine racing dispatcher with staged escalation
//!   (HTTP → browser → stealth browser)
//! - Per-host domain memory that short-circuits future races
//! - Adaptive headless-browser page pool with health tracking
//! - Browser pipeline: stealth injection, request hijacking/ad blocking,
//!   wait strategies, overlay removal, scripted actions
//! - SimHash fingerprints for duplicate detection
//! - TTL + capacity bounded response cache

pub mod api;
pub mod cache;
pub mod config;
pub mod content;
pub mod engine;
pub mod models;
pub mod scraper;
pub mod similarity;

pub use config::Config;
