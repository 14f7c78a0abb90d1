// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bitmaps, elements, and atomic update transactions over a GPU surface
//! compositor.
//!
//! # Architecture
//!
//! ```text
//!   Host (process-wide init/deinit, display bring-up)
//!     │ borrowed by
//!     ▼
//!   Compositor ── owns ──► Bitmap set ◄── retained by ── Element set
//!     │                                                     │
//!     └──────── update(priority, body) ─── enlists ─────────┘
//!                          │
//!                          ▼
//!                 GpuService::update_submit_sync
//! ```
//!
//! **[`host`]** — [`Host`] initializes the GPU service once per process and
//! opens [`Display`]s.
//!
//! **[`bitmap`]** — [`Bitmap`] owns one GPU resource: row I/O, painting
//! primitives, dirty tracking, and the retain count.
//!
//! **[`element`]** — [`Element`] binds a bitmap to a rectangle on a display
//! and enlists its changes on an update.
//!
//! **[`compositor`]** — [`Compositor`] owns the bitmaps and elements of one
//! display and runs update transactions.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use lamina_backend_soft::SoftGpu;
//! use lamina_compositor::{Compositor, Host};
//! use lamina_core::geometry::{Point, Rect, Size};
//! use lamina_core::pixel::{PixelFormat, Rgba16};
//! use lamina_core::service::AlphaSource;
//!
//! let gpu = Arc::new(SoftGpu::new().with_display(0, Size::new(64, 48)));
//! let host = Host::init(gpu.clone()).unwrap();
//! let display = host.open_display(0).unwrap();
//! let compositor = Compositor::new(&host, display).unwrap();
//!
//! let bitmap = compositor.new_bitmap(Size::new(8, 8), PixelFormat::Rgba32).unwrap();
//! bitmap.clear_to(Rgba16::WHITE).unwrap();
//! let id = compositor
//!     .update(0, |c| {
//!         c.add_element(Rect::new(4, 4, 0, 0), &bitmap, 0, 1.0, AlphaSource::FromSource)
//!     })
//!     .unwrap();
//! assert_eq!(gpu.pixel_at(display.handle, Point::new(4, 4)), Some([0xff; 4]));
//!
//! compositor.update(0, |c| c.remove_element(id)).unwrap();
//! compositor.close().unwrap();
//! host.close_display(display).unwrap();
//! ```

pub mod bitmap;
pub mod compositor;
pub mod element;
pub mod host;
mod store;

pub use bitmap::{Bitmap, ImageView};
pub use compositor::{Compositor, CompositorConfig, ElementInfo};
pub use element::Element;
pub use host::{Display, Host};
pub use store::ElementId;
