mod ids;
pub use ids::{BuildTaskId, ClusterId, GitRepoId, LabelId, PackageId, RegistryId, WorkspaceId};

mod codes;
pub use codes::ErrorCode;

mod time_serde;

mod build_status;
pub use build_status::BuildTaskStatus;

mod build_task;
pub use build_task::BuildTask;

mod build_query;
pub use build_query::{BuildTaskPage, BuildTaskQuery};

mod build_event;
pub use build_event::BuildEvent;

mod kv;
pub use kv::KeyValue;

mod env;
pub use env::{EnvLayers, EnvPlan, EnvironmentMap};

mod resources;
pub use resources::{ResourceQuantities, ResourceSet, RunResources, RunResourcesSpec};

mod array;
pub use array::{ArrayPlan, ArraySpec, Indexer};

mod artifact;
pub use artifact::{ArtifactRef, BuildOutput, PackageArtifact};

mod registry;
pub use registry::{RegistryCredential, RegistryInfo};

mod package;
pub use package::{BuildInputs, BuildSpec, PackageInfo};

mod references;
pub use references::{ClusterRef, EnvironmentSet, GitRepoRef, LabelRef};

mod manifest;
pub use manifest::{JobRunManifest, JobSubmission};

/// Class identifier selecting a package build strategy (e.g. `"python-pip"`).
pub type BuildClassId = String;

/// Timeout value in milliseconds.
pub type TimeoutMs = u64;
