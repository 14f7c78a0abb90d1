// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording, pretty-printing, and JSON export for lamina compositor traces.
//!
//! This crate provides [`TraceSink`](lamina_core::trace::TraceSink)
//! implementations for development and post-mortem analysis:
//!
//! - [`pretty::PrettyPrintSink`] — human-readable one-line-per-event output.
//! - [`recorder::RecorderSink`] — compact binary recording with
//!   [`recorder::decode`] for playback.
//! - [`json::export`] — writes recorded bytes as a JSON array.
//! - [`shared::SharedSink`] — hands a sink to a compositor while keeping it
//!   reachable, so a recording can be read back afterwards.

pub mod json;
pub mod pretty;
pub mod recorder;
pub mod shared;
