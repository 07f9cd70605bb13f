use std::fmt;

use serde::{Serialize, Serializer};

/// Stable error codes surfaced to callers.
///
/// The spelling of every code is part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidWorkspace,
    InvalidPackage,
    InvalidPackageRuntime,
    InvalidCluster,
    InvalidRegistry,
    InvalidRegistryCredentials,
    InvalidJobManifest,
    InvalidJobLabelsLimit,
    InvalidJobLabelReference,
    InvalidJobGitRepo,
    InvalidJobArguments,
    InvalidJobArray,
    InvalidJobResources,
    InvalidJobEnvironment,
    UnknownError,
}

impl ErrorCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidWorkspace => "JOB_INVALID_WORKSPACE",
            ErrorCode::InvalidPackage => "JOB_INVALID_PACKAGE",
            ErrorCode::InvalidPackageRuntime => "JOB_INVALID_PACKAGE_RUNTIME",
            ErrorCode::InvalidCluster => "JOB_INVALID_CLUSTER",
            ErrorCode::InvalidRegistry => "JOB_INVALID_REGISTRY",
            ErrorCode::InvalidRegistryCredentials => "JOB_INVALID_REGISTRY_CREDENTIALS",
            ErrorCode::InvalidJobManifest => "JOB_INVALID_JOB_MANIFEST",
            ErrorCode::InvalidJobLabelsLimit => "JOB_INVALID_JOB_LABELS_LIMIT",
            ErrorCode::InvalidJobLabelReference => "JOB_INVALID_JOB_LABEL_REFERENCE",
            ErrorCode::InvalidJobGitRepo => "JOB_INVALID_JOB_GIT_REPO",
            ErrorCode::InvalidJobArguments => "JOB_INVALID_JOB_ARGUMENTS",
            ErrorCode::InvalidJobArray => "JOB_INVALID_JOB_ARRAY",
            ErrorCode::InvalidJobResources => "JOB_INVALID_JOB_RESOURCES",
            ErrorCode::InvalidJobEnvironment => "JOB_INVALID_JOB_ENVIRONMENT",
            ErrorCode::UnknownError => "JOB_UNKNOWN_ERROR",
        }
    }

    /// Returns `true` for codes caused by caller input rather than infrastructure.
    pub fn is_validation(&self) -> bool {
        !matches!(self, ErrorCode::UnknownError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_spelling_is_stable() {
        assert_eq!(
            ErrorCode::InvalidJobResources.as_str(),
            "JOB_INVALID_JOB_RESOURCES"
        );
        assert_eq!(
            ErrorCode::InvalidJobEnvironment.as_str(),
            "JOB_INVALID_JOB_ENVIRONMENT"
        );
        assert_eq!(ErrorCode::InvalidJobArray.as_str(), "JOB_INVALID_JOB_ARRAY");
        assert_eq!(
            ErrorCode::InvalidRegistryCredentials.as_str(),
            "JOB_INVALID_REGISTRY_CREDENTIALS"
        );
        assert_eq!(
            ErrorCode::InvalidJobLabelsLimit.as_str(),
            "JOB_INVALID_JOB_LABELS_LIMIT"
        );
        assert_eq!(
            ErrorCode::InvalidJobLabelReference.as_str(),
            "JOB_INVALID_JOB_LABEL_REFERENCE"
        );
        assert_eq!(ErrorCode::InvalidJobGitRepo.as_str(), "JOB_INVALID_JOB_GIT_REPO");
        assert_eq!(ErrorCode::InvalidPackage.as_str(), "JOB_INVALID_PACKAGE");
        assert_eq!(
            ErrorCode::InvalidPackageRuntime.as_str(),
            "JOB_INVALID_PACKAGE_RUNTIME"
        );
        assert!(ErrorCode::InvalidPackageRuntime.is_validation());
    }

    #[test]
    fn serializes_as_code_string() {
        let json = serde_json::to_string(&ErrorCode::InvalidJobArray).unwrap();
        assert_eq!(json, r#""JOB_INVALID_JOB_ARRAY""#);
    }
}
