//! Monotonic modification versions.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// Process-wide monotonically increasing modification stamp.
///
/// Every call to [`Version::next`] returns a stamp strictly newer than any
/// stamp handed out before, so "A was built after B was modified" reduces to
/// `a > b` across unrelated objects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u64);

impl Version {
    /// Older than every issued stamp.
    pub const NEVER: Self = Self(0);

    /// Issue a fresh stamp.
    #[inline]
    pub fn next() -> Self {
        Self(NEXT_VERSION.fetch_add(1, Ordering::Relaxed))
    }

    /// Replace this stamp with a fresh one.
    #[inline]
    pub fn touch(&mut self) {
        *self = Self::next();
    }

    /// Raw stamp value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}
