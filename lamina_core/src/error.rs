// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy shared by the compositor and its GPU services.
//!
//! All errors are returned by value. The only fatal condition in the stack is
//! a retain-count underflow, which panics at the point of detection.

use alloc::borrow::Cow;
use alloc::vec::Vec;
use core::fmt;

use crate::pixel::PixelFormat;

/// Errors from compositor and GPU service operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// An input violated a documented precondition.
    BadParameter(&'static str),
    /// The object is not tracked by the receiver.
    NotFound(&'static str),
    /// The operation is not available for this pixel format.
    Unsupported(PixelFormat),
    /// An invariant was violated or the GPU service refused the request.
    Internal(Cow<'static, str>),
    /// Several independent failures from a path that continued past each one,
    /// in the order they occurred.
    Compound(Vec<Self>),
}

/// The kind of an [`Error`], without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::BadParameter`].
    BadParameter,
    /// See [`Error::NotFound`].
    NotFound,
    /// See [`Error::Unsupported`].
    Unsupported,
    /// See [`Error::Internal`].
    Internal,
    /// See [`Error::Compound`].
    Compound,
}

impl Error {
    /// Creates an [`Error::Internal`] from a static message.
    #[inline]
    #[must_use]
    pub const fn internal(msg: &'static str) -> Self {
        Self::Internal(Cow::Borrowed(msg))
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadParameter(_) => ErrorKind::BadParameter,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Internal(_) => ErrorKind::Internal,
            Self::Compound(_) => ErrorKind::Compound,
        }
    }

    /// Folds a list of errors collected along a best-effort path.
    ///
    /// No errors is success and a single error is returned as-is; anything
    /// more becomes [`Error::Compound`].
    pub fn compound(mut errors: Vec<Self>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Compound(errors)),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadParameter(what) => write!(f, "bad parameter: {what}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Unsupported(format) => write!(f, "unsupported pixel format {format:?}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::Compound(errors) => {
                write!(f, "{} errors:", errors.len())?;
                for e in errors {
                    write!(f, " [{e}]")?;
                }
                Ok(())
            }
        }
    }
}

impl core::error::Error for Error {}

/// Result alias defaulting to [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;
