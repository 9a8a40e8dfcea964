//! # Forgemill: schema-driven layered backend code generation
//!
//! Forgemill introspects a relational schema and generates the layered
//! backend source (entity, data-access, service, and controller layers) for
//! every selected table, using an external text-generation oracle to
//! synthesize each layer and a crash-safe writer to materialize the results
//! into a target project tree.
//!
//! ## Pipeline
//!
//! 1. **Schema introspection** (`schema`): read table, column, and
//!    primary-key metadata once per run.
//! 2. **Prompt construction** (`prompt`): render a deterministic per-table,
//!    per-layer request for the oracle.
//! 3. **Synthesis** (`oracle`): call the oracle with retry and backoff,
//!    enforcing the single-code-block response contract.
//! 4. **Materialization** (`fs_utils`): atomic overwrite for system-owned
//!    layers, create-if-absent for layers a developer is expected to extend.
//! 5. **Orchestration** (`pipeline`): bounded-parallel task execution and a
//!    per-table, per-layer run report.
//!
//! ## Example configuration
//!
//! ```yaml
//! module_name: admin
//! project_root: /work/backend
//! table_prefixes:
//!   - sys_
//! oracle:
//!   model: deepseek-chat
//!   max_attempts: 3
//! max_concurrent_tasks: 4
//! ```

// Core modules
pub mod config;
pub mod fs_utils;
pub mod layer;
pub mod oracle;
pub mod pipeline;
pub mod prompt;
pub mod schema;

// Re-export key types
pub use config::{GenerationConfig, OracleConfig, PromptConfig};
pub use layer::{LayerKind, WriteMode};
pub use oracle::{CodeOracle, HttpOracleClient, OracleError, RetryPolicy, SynthesisClient};
pub use pipeline::{
    CancelFlag, GenerationReport, Orchestrator, RunError, RunStatus, StatusProbe, TaskOutcome,
};
pub use prompt::{LayerPayload, OracleRequest, PromptBuilder};
pub use schema::{ColumnDefinition, SchemaError, SchemaIntrospector, TableSchema, TableSelection};
