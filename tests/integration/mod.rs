//! Integration test suite for the conductor engine.
//!
//! These tests exercise the full path from user request to terminal
//! workflow state: planning, parsing, DAG validation, wavefront
//! execution, failure propagation, and cancellation. They use
//! scripted agents instead of real model calls, making them safe to
//! run in CI environments.
//!
//! # Test Categories
//!
//! - `workflow_e2e`: full request-to-completion runs and event order
//! - `parallel_tasks`: wavefront concurrency and worker limits
//! - `failure_paths`: malformed plans, cycles, and retry exhaustion
//! - `cancellation`: cooperative cancel semantics

mod fixtures;

mod cancellation;
mod failure_paths;
mod parallel_tasks;
