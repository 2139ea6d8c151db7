//! Identifier value objects
//!
//! Every entity is keyed by a string newtype so that a step id can never be
//! passed where an execution id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random identifier
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Borrow the raw identifier
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Value object: Flow ID
    FlowId
);
string_id!(
    /// Value object: Step ID
    StepId
);
string_id!(
    /// Value object: Execution ID
    ExecutionId
);
string_id!(
    /// Value object: Log entry ID
    LogEntryId
);
string_id!(
    /// Value object: ID of the user on whose behalf an execution runs
    UserId
);
