//! Build spec generation.
//!
//! A build class turns the inputs of a package into concrete build instructions. Classes are
//! registered in a [`ClassRouter`] keyed by class id.

use std::{collections::HashMap, sync::Arc};

use kiln_model::{BuildInputs, BuildSpec, ErrorCode, PackageId};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{instrument, trace};

mod template;
pub use template::{TemplateClass, builtin_classes, templates_from_json};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("unknown build class: {0}")]
    UnknownClass(String),
    #[error("class {0}: package has no runtime")]
    MissingRuntime(String),
    #[error("invalid job manifest: {0}")]
    InvalidJobManifest(String),
}

impl SpecError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SpecError::UnknownClass(_) => ErrorCode::InvalidPackage,
            SpecError::MissingRuntime(_) => ErrorCode::InvalidPackageRuntime,
            SpecError::InvalidJobManifest(_) => ErrorCode::InvalidJobManifest,
        }
    }
}

/// A package build strategy.
///
/// Implementations must be deterministic: identical inputs render a byte-identical spec.
pub trait BuildClass: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn generate(&self, inputs: &BuildInputs) -> Result<BuildSpec, SpecError>;
}

/// Registry of build classes.
#[derive(Default, Clone)]
pub struct ClassRouter {
    classes: HashMap<String, Arc<dyn BuildClass>>,
}

impl ClassRouter {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Router preloaded with [`builtin_classes`].
    pub fn with_builtins() -> Self {
        let mut router = Self::new();
        for class in builtin_classes() {
            router.register(Arc::new(class));
        }
        router
    }

    /// Register a class; a class with the same name is replaced.
    pub fn register(&mut self, class: Arc<dyn BuildClass>) {
        self.classes.insert(class.name().to_string(), class);
    }

    pub fn get(&self, class: &str) -> Option<&Arc<dyn BuildClass>> {
        self.classes.get(class)
    }

    /// Registered class ids, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[instrument(level = "debug", skip(self, inputs))]
    pub fn generate(&self, class: &str, inputs: &BuildInputs) -> Result<BuildSpec, SpecError> {
        let c = self
            .get(class)
            .ok_or_else(|| SpecError::UnknownClass(class.to_string()))?;

        let spec = c.generate(inputs)?;
        trace!(class, bytes = spec.content.len(), "build spec rendered");
        Ok(spec)
    }
}

/// Reuse key of a build: hex SHA-256 over package id, class and rendered spec.
pub fn fingerprint(package: &PackageId, spec: &BuildSpec) -> String {
    let mut hasher = Sha256::new();
    for part in [package.as_str(), spec.class.as_str(), spec.content.as_str()] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl BuildClass for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn generate(&self, _inputs: &BuildInputs) -> Result<BuildSpec, SpecError> {
            Ok(BuildSpec {
                class: "fixed".into(),
                content: "FROM scratch\n".into(),
            })
        }
    }

    #[test]
    fn unknown_class_maps_to_invalid_package() {
        let router = ClassRouter::new();
        let err = router.generate("nope", &BuildInputs::default()).unwrap_err();
        assert_eq!(err, SpecError::UnknownClass("nope".into()));
        assert_eq!(err.code(), ErrorCode::InvalidPackage);
    }

    #[test]
    fn registered_class_is_dispatched() {
        let mut router = ClassRouter::new();
        router.register(Arc::new(Fixed));
        let spec = router.generate("fixed", &BuildInputs::default()).unwrap();
        assert_eq!(spec.content, "FROM scratch\n");
        assert_eq!(router.names(), vec!["fixed"]);
    }

    #[test]
    fn builtins_are_registered() {
        let router = ClassRouter::with_builtins();
        assert!(router.get("python-pip").is_some());
        assert!(router.get("node-npm").is_some());
    }

    #[test]
    fn fingerprint_separates_fields() {
        let pkg = PackageId::from("pkg");
        let a = BuildSpec {
            class: "ab".into(),
            content: "c".into(),
        };
        let b = BuildSpec {
            class: "a".into(),
            content: "bc".into(),
        };
        let fa = fingerprint(&pkg, &a);
        assert_eq!(fa.len(), 64);
        assert_ne!(fa, fingerprint(&pkg, &b));
        assert_eq!(fa, fingerprint(&pkg, &a.clone()));
        assert_ne!(fa, fingerprint(&PackageId::from("other"), &a));
    }
}
