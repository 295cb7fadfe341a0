//! Handles for plan nodes and registered endpoints.
//!
//! Both are plain `u64` newtypes so a node handle can never be passed where an
//! endpoint is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle!(
    /// Index into an `OpArena`. Ordering follows allocation order; the join
    /// graph breaks ties on it.
    NodeId,
    "node"
);
handle!(
    /// Catalog key of a remote endpoint.
    EndpointId,
    "endpoint"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_handle_kind() {
        assert_eq!(NodeId::new(3).to_string(), "node#3");
        assert_eq!(EndpointId::new(2).to_string(), "endpoint#2");
    }

    #[test]
    fn test_serializes_as_bare_integer() {
        assert_eq!(serde_json::to_string(&NodeId::new(7)).unwrap(), "7");
        let id: EndpointId = serde_json::from_str("4").unwrap();
        assert_eq!(id.get(), 4);
    }
}
