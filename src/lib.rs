pub mod artifacts;
pub mod context;
pub mod errors;
pub mod failure;
pub mod hooks;
pub mod init;
pub mod logging;
pub mod phase;
pub mod storage;
pub mod util;
pub mod workflow_config;

pub use context::WorkflowContext;
pub use phase::Phase;
pub use workflow_config::WorkflowConfig;
