use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns `true` for an empty or whitespace-only identifier.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
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

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of the workspace owning tasks, packages and artifacts.
    WorkspaceId
);
string_id!(
    /// Identifier of a build task row.
    BuildTaskId
);
string_id!(
    /// Logical package identifier.
    PackageId
);
string_id!(
    /// Identifier of a container registry.
    RegistryId
);
string_id!(LabelId);
string_id!(GitRepoId);
string_id!(ClusterId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_transparent_strings() {
        let id = BuildTaskId::from("bt-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""bt-1""#);
        assert_eq!(id.to_string(), "bt-1");
    }

    #[test]
    fn blank_detection() {
        assert!(WorkspaceId::from("  ").is_blank());
        assert!(!WorkspaceId::from("ws").is_blank());
    }
}
