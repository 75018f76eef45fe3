//! Core scheduling types: identifiers, schedules, jobs and schedule resolution.

pub mod job;
pub mod resolver;
pub mod schedule;
pub mod types;
