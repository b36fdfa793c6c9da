//! Scraper and API for Home Access style student grade portals.
//!
//! The [`portal`] module logs in, keeps emulated browser sessions, and parses
//! grades, assignments, and report cards. The [`gpa`] module turns those into
//! GPA figures under configurable scales. The [`server`] module exposes both
//! over HTTP.

pub mod config;
pub mod gpa;
pub mod portal;
pub mod server;
pub mod types;
