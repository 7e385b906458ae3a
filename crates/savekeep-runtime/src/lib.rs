// ABOUTME: Runtime for savekeep: the save coordinator and the machinery it runs on.
// ABOUTME: Holds configuration, shutdown signalling, the retry supervisor, and the scene interface.

pub mod config;
pub mod coordinator;
pub mod result;
pub mod scene;
pub mod shutdown;
pub mod supervisor;

pub use config::{ConfigError, DEFAULT_OBFUSCATION_KEY, SavekeepConfig};
pub use coordinator::SaveCoordinator;
pub use result::{FailureKind, OperationError, OperationResult};
pub use scene::{SceneController, SceneError, StaticScene, transition_needed};
pub use shutdown::{ShutdownSignal, ShuttingDown};
pub use supervisor::{AttemptError, Attempted, RetryFailure, RetryPolicy, Retryable, retry, run_with_timeout};
