// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel formats, geometry, and the GPU service contract for layered display
//! compositing.
//!
//! `lamina_core` holds everything the compositor needs that does not itself
//! own GPU state. It is `no_std` compatible (with `alloc`).
//!
//! # Architecture
//!
//! ```text
//!   lamina_compositor (Bitmap, Element, Compositor)
//!       │  uses pixel packing, geometry, errors
//!       ▼
//!   GpuService ──► resources, elements, update transactions
//!       ▲
//!       │  implemented by
//!   backend crates (e.g. lamina_backend_soft)
//! ```
//!
//! **[`pixel`]** — Supported pixel layouts, 16-bit generic colors, and
//! packing to and from the on-the-wire byte order. Row stride arithmetic.
//!
//! **[`geometry`]** — Integer [`Point`](geometry::Point),
//! [`Size`](geometry::Size), and [`Rect`](geometry::Rect) in display pixel
//! space (origin top-left, y grows down).
//!
//! **[`error`]** — The error taxonomy shared by every layer.
//!
//! **[`handle`]** — Opaque handle newtypes issued by the GPU service.
//!
//! **[`service`]** — The [`GpuService`](service::GpuService) trait that
//! backends implement.
//!
//! **[`trace`]** — [`TraceSink`](trace::TraceSink) trait and event types for
//! compositor instrumentation.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod error;
pub mod geometry;
pub mod handle;
pub mod pixel;
pub mod service;
pub mod trace;

pub use error::{Error, ErrorKind, Result};
