pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

pub mod config;
pub use config::{BackoffStrategy, BuildConfig, PushIdempotency, RetryPolicy};

pub mod error;
pub use error::{CoreError, ResolveError};

pub mod locks;

pub mod machine;
pub use machine::{
    ActiveRun, BuildMachine, BuildRequest, BuildRunner, BuildTicket, RunId, SweepReport, Sweeper,
    Transition, TransitionOutcome,
};

pub mod memory;
pub use memory::{CatalogSeed, MemoryCatalog, MemoryScheduler};

pub mod ports;

pub mod publish;
pub use publish::{PublishError, PublishTarget, RegistryPublisher};

pub mod resolve;
pub use resolve::{JobManifestResolver, WaitOptions};

pub mod service;
pub use service::{BuildService, Engine, EngineBuilder, JobService, Ports};

pub mod spec;
pub use spec::{BuildClass, ClassRouter, SpecError, TemplateClass};

pub mod state;
pub use state::{BuildTaskStore, MemoryTaskStore, StoreError};

mod subscriber;
pub use subscriber::BuildSubscriber;
