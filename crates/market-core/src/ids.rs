//! Typed Identifiers
//!
//! Every entity gets its own UUID newtype so a `TierId` can never be passed
//! where a `UserId` is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Parse from the string form used in URLs and payment metadata
            pub fn parse(s: &str) -> crate::Result<Self> {
                Uuid::parse_str(s.trim()).map(Self).map_err(|_| {
                    crate::MarketError::validation(format!(
                        "invalid {}: {s}",
                        stringify!($name)
                    ))
                })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Maintainer or customer
    UserId
);
entity_id!(TierId);
entity_id!(FeatureId);
entity_id!(ContractId);
entity_id!(ChargeId);
entity_id!(SubscriptionId);
entity_id!(ProspectId);
entity_id!(PageId);
entity_id!(
    /// Links an initiated checkout to the payment event that settles it
    CheckoutId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrips_display() {
        let id = TierId::new();
        assert_eq!(TierId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = UserId::parse("not-a-uuid").unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }
}
