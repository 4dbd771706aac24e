//! Job-application tracking from recruiting emails: field extraction,
//! status classification, per-employer records with a one-way status
//! hierarchy, and conservative deletion planning.

pub mod ai;
pub mod classify;
pub mod confidence;
pub mod config;
pub mod db;
pub mod deletion;
pub mod extract;
pub mod hierarchy;
pub mod logging;
pub mod merge;
pub mod models;
pub mod patterns;
pub mod pipeline;
pub mod report;
pub mod store;
pub mod tracker;
