//! Judgebox execution engine
//!
//! Runs untrusted source code against a batch of test cases. Each case gets
//! its own throwaway workspace and its own isolated container; the outputs
//! are classified into a verdict and folded into one `ExecutionReport`.
//!
//! ```text
//! Executor::execute
//!   -> LanguageRegistry::profile_for
//!   -> per test case: WorkspaceManager::create -> Sandbox::run -> Workspace::destroy
//!                     -> classifier::evaluate
//!   -> executor::aggregate
//! ```

pub mod classifier;
pub mod error;
pub mod executor;
pub mod language;
pub mod sandbox;
pub mod workspace;


pub use classifier::{DiagnosticMatcher, SubstringMatcher};
pub use error::{ExecuteError, RegistryError, SandboxError, WorkspaceError};
pub use executor::{Executor, Limits};
pub use language::{FilenameRule, LanguageProfile, LanguageRegistry};
pub use sandbox::{DockerSandbox, RawOutput, Sandbox, SandboxSpec};
pub use workspace::{Workspace, WorkspaceManager};
