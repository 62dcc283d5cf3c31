//! Classification pipeline for a live, continuously mutating chat feed:
//! detects newly rendered items, classifies each at most once through a
//! remote relay, caches the verdicts, and applies idempotent visual
//! treatment driven by a reactive settings snapshot.

pub mod app;
pub mod config;
pub mod document;
pub mod domain;
pub mod infrastructure;
pub mod pipeline;
pub mod relay;
pub mod settings;
