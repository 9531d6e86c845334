//! Integration test framework for pscore
#![allow(missing_docs)]
//!
//! This crate provides mock collaborators and fixtures for scenario tests
//! of the network-side GMM and SM procedures.
//!
//! # Components
//!
//! - [`mock_core`] - Recording transport, scripted AuC, schedulers and a
//!   scripted terminal
//! - [`test_fixtures`] - Core configuration and uplink message builders
//! - [`test_utils`] - Logging setup and async helpers
//!
//! # Test Categories
//!
//! 1. **Attach scenarios** - Attach with identification and authentication,
//!    timer expiry, authentication mismatch, preemption
//! 2. **Mobility procedures** - RAU, service request, detach, PDP contexts
//! 3. **Multi-session** - Independent sessions driven from concurrent tasks

pub mod mock_core;
pub mod test_fixtures;
pub mod test_utils;

pub use mock_core::{
    expected_response, MockCore, MockCoreError, RecordingScheduler, RecordingTransport,
    ScriptedAuc, ScriptedTerminal, TokioScheduler,
};
pub use test_fixtures::{core_config, test_imsi, TEST_IMEISV, TEST_IMSI};
pub use test_utils::{
    init_test_logging, wait_for_condition, TestResult, DEFAULT_POLL_INTERVAL, DEFAULT_TEST_TIMEOUT,
};
