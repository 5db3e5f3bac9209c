use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! newtype_string {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Return the inner string as a str slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
    ($name:ident, $doc:expr, generated) => {
        newtype_string!($name, $doc);

        impl $name {
            /// Generate a fresh, time-ordered (UUID v7) identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::now_v7().to_string())
            }
        }
    };
}

newtype_string!(EventId, "Identifier of a stored inbound event.", generated);
newtype_string!(DeliveryId, "Identifier of an outbound delivery lineage.", generated);
newtype_string!(EndpointId, "Identifier of a registered outbound endpoint.", generated);
newtype_string!(SubscriptionId, "Identifier of an endpoint subscription.", generated);
newtype_string!(SourceId, "Identifies an inbound webhook producer (e.g. `github`).");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_from_str() {
        let source = SourceId::from("github");
        assert_eq!(source.as_str(), "github");
        assert_eq!(&*source, "github");
    }

    #[test]
    fn newtype_display() {
        let id = DeliveryId::new("d-1");
        assert_eq!(id.to_string(), "d-1");
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = DeliveryId::generate();
        let b = DeliveryId::generate();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn serde_transparent() {
        let id = EndpointId::new("ep-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"ep-1\"");
        let back: EndpointId = serde_json::from_str("\"ep-1\"").unwrap();
        assert_eq!(back, id);
    }
}
