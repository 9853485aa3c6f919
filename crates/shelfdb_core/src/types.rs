//! Core type definitions for ShelfDB.

use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw ID value.
            #[must_use]
            pub const fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a transaction.
    ///
    /// Transaction IDs are monotonically increasing and never reused, so
    /// their order is the order of submission to the scheduler.
    TransactionId,
    "txn"
);

define_id!(
    /// Unique identifier for a request.
    RequestId,
    "req"
);

define_id!(
    /// Unique identifier for a cursor.
    CursorId,
    "cur"
);

define_id!(
    /// Unique identifier for a database connection.
    ConnectionId,
    "conn"
);

define_id!(
    /// Unique identifier for an open or delete request.
    OpenId,
    "open"
);

/// Monotonic allocator shared by all identifier kinds.
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub(crate) fn next(&mut self) -> u64 {
        self.next += 1;
        self.next
    }
}
