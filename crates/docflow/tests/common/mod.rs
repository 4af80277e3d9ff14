//! Shared test utilities for docflow integration tests.
//!
//! - `TestHarness` wires a worker to in-process collaborators
//! - `fakes` holds the scripted OCR engine, recording indexer and a store
//!   that can be switched off

pub mod fakes;
pub mod harness;

pub use fakes::{OcrStep, OutageStore, RecordingIndexer, ScriptedOcr};
pub use harness::TestHarness;
