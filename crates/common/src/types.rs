use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is empty or whitespace.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Billing-engine customer identifier.
    CustomerId
);

string_id!(
    /// Storefront customer identifier, used for address lookups and membership tags.
    StorefrontCustomerId
);

string_id!(
    /// Billing-engine subscription identifier.
    SubscriptionId
);

string_id!(
    /// Billing-engine plan identifier. Plan ids carry conventions (country suffix,
    /// new-customer marker) that the domain layer interprets.
    PlanId
);

string_id!(
    /// Rotation cycle identifier.
    CycleId
);

string_id!(
    /// Catalog product identifier.
    ProductId
);

string_id!(
    /// Catalog variant identifier.
    VariantId
);
