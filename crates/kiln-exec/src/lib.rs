mod error;
pub use error::{ExecError, ExecResult};

mod util;

pub mod utils;
pub use utils::limits::{RlimitConfig, attach_rlimits};

#[cfg(feature = "proc")]
pub mod proc;
#[cfg(feature = "proc")]
pub use proc::{ProcBuilder, ProcPusher, ToolCommand};

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    #[cfg(feature = "proc")]
    pub use crate::proc::{ProcBuilder, ProcPusher, ToolCommand};
}
