// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opaque handles issued by the GPU service.
//!
//! Handles are assigned by backends and passed through the compositor without
//! interpretation. The raw value `0` is reserved as the null handle; a service
//! never issues it.

use core::fmt;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub u32);

        impl $name {
            /// The null handle.
            pub const NONE: Self = Self(0);

            /// Returns `true` for the null handle.
            #[inline]
            #[must_use]
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

handle!(
    /// Identifies an open display.
    DisplayHandle
);

handle!(
    /// Identifies a GPU-resident pixel buffer.
    ResourceHandle
);

handle!(
    /// Identifies an element placed on a display.
    ElementHandle
);

handle!(
    /// Identifies an open update transaction.
    UpdateHandle
);

#[cfg(test)]
mod tests {
    use alloc::format;

    use super::*;

    #[test]
    fn zero_is_null() {
        assert!(DisplayHandle::NONE.is_null());
        assert!(UpdateHandle::default().is_null());
        assert!(!ResourceHandle(7).is_null());
    }

    #[test]
    fn debug_names_the_kind() {
        assert_eq!(format!("{:?}", ElementHandle(3)), "ElementHandle(3)");
    }
}
