//! Integration tests for harbormaster.
//!
//! These tests verify end-to-end scenarios including:
//! - Job registration, overlap handling and shutdown on a live scheduler
//! - Concurrent update runs sharing one orchestrator
//! - Built-in jobs wired to settings, scheduler and orchestrator

mod common;

mod integration {
    pub mod jobs;
    pub mod orchestrator;
    pub mod scheduler;
}
