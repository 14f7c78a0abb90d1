// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Process-wide GPU service bring-up.
//!
//! GPU surface services need one `host_init` before anything else and one
//! `host_deinit` after everything else. [`Host`] is the token for that
//! window: at most one exists per process, and every
//! [`Compositor`](crate::Compositor) borrows it, so it cannot be dropped while
//! a compositor is alive.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lamina_core::geometry::Size;
use lamina_core::handle::DisplayHandle;
use lamina_core::service::GpuService;
use lamina_core::{Error, Result};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// An open display: its handle and visible size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Display {
    /// Service handle.
    pub handle: DisplayHandle,
    /// Visible area in pixels.
    pub size: Size,
}

/// The initialized GPU service.
pub struct Host {
    service: Arc<dyn GpuService>,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}

impl Host {
    /// Initializes `service` for this process.
    ///
    /// Fails with [`Error::Internal`] if another `Host` is alive. If the
    /// service's own initialization fails, no `Host` is created and `init`
    /// may be retried.
    pub fn init(service: Arc<dyn GpuService>) -> Result<Self> {
        if INITIALIZED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::internal("host already initialized"));
        }
        if let Err(e) = service.host_init() {
            INITIALIZED.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(Self { service })
    }

    /// Returns `true` while a `Host` is alive in this process.
    #[must_use]
    pub fn is_initialized() -> bool {
        INITIALIZED.load(Ordering::Acquire)
    }

    /// The service this host initialized.
    #[must_use]
    pub fn service(&self) -> &Arc<dyn GpuService> {
        &self.service
    }

    /// Opens display `device` and queries its size.
    pub fn open_display(&self, device: u32) -> Result<Display> {
        let handle = self.service.display_open(device)?;
        if handle.is_null() {
            return Err(Error::internal("service returned a null display"));
        }
        match self.service.display_info(handle) {
            Ok(info) => Ok(Display {
                handle,
                size: info.size,
            }),
            Err(e) => {
                let _ = self.service.display_close(handle);
                Err(e)
            }
        }
    }

    /// Closes a display opened with [`open_display`](Self::open_display).
    ///
    /// Compositors never close their display; this is left to the caller
    /// once every compositor on it is gone.
    pub fn close_display(&self, display: Display) -> Result<()> {
        self.service.display_close(display.handle)
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.service.host_deinit();
        INITIALIZED.store(false, Ordering::Release);
    }
}
