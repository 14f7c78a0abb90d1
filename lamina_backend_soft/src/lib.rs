// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Software GPU surface service for lamina.
//!
//! [`SoftGpu`] implements [`GpuService`](lamina_core::service::GpuService)
//! entirely on the CPU:
//!
//! - Resources are plain byte buffers with 16-byte aligned rows.
//! - Element operations are enlisted on an update and applied atomically by
//!   `update_submit_sync`, after which every open display's scan-out image is
//!   recomposited.
//! - [`Stats`] counts every contract operation, and [`SoftGpu::fail_next`]
//!   injects a single failure into the next call of a chosen operation.
//!
//! It is the reference backend for tests and for hosts without a hardware
//! compositor.
//!
//! ```
//! use lamina_backend_soft::SoftGpu;
//! use lamina_core::geometry::Size;
//! use lamina_core::service::GpuService;
//!
//! let gpu = SoftGpu::new().with_display(0, Size::new(320, 240));
//! let display = gpu.display_open(0).unwrap();
//! assert_eq!(gpu.display_info(display).unwrap().size, Size::new(320, 240));
//! ```

mod compose;
mod gpu;

pub use gpu::{Fault, SoftGpu, Stats};
