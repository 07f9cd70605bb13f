//! Job submission resolution.
//!
//! The leaf resolvers are independent and side-effect free apart from catalog reads;
//! [`JobManifestResolver`] chains them and obtains the package artifact.

mod array;
pub use array::{ArrayError, plan_array};

mod environment;
pub use environment::resolve_environment;

mod manifest;
pub use manifest::{JobManifestResolver, WaitOptions, validate_arguments};

mod references;
pub use references::{ReferenceError, resolve_git_repo, resolve_labels};

mod resources;
pub use resources::{ResourceError, ResourceKind, validate_resources};
