//! Generation pipeline: task fan-out, write-mode policy, and the run report.
//!
//! The orchestrator reads the schema snapshot once, fans out one task per
//! (table, layer) pair under a bounded worker pool, and aggregates outcomes
//! into a [`GenerationReport`]. Task failures are isolated: one layer failing
//! never aborts sibling layers or other tables.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::GenerationConfig;
use crate::fs_utils;
use crate::layer::{LayerKind, WriteMode};
use crate::oracle::{CodeOracle, SynthesisClient};
use crate::prompt::{LayerPayload, PromptBuilder};
use crate::schema::{SchemaError, SchemaIntrospector, TableSchema};

/// Terminal state of one (table, layer) task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// File written (created or atomically replaced).
    Generated,
    /// A preserve-mode file already existed and was left untouched.
    SkippedPreserved,
    /// The task failed; sibling tasks were unaffected.
    Failed(String),
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Generated => write!(f, "generated"),
            TaskOutcome::SkippedPreserved => write!(f, "skipped, preserved"),
            TaskOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Per-table, per-layer outcomes for one run. Never mutated after the run
/// completes. Tables appear in lexicographic order, layers in declaration
/// order, regardless of execution order.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tables: IndexMap<String, Vec<(LayerKind, TaskOutcome)>>,
}

impl GenerationReport {
    pub fn task_count(&self) -> usize {
        self.tables.values().map(|layers| layers.len()).sum()
    }

    pub fn generated_count(&self) -> usize {
        self.count_matching(|o| matches!(o, TaskOutcome::Generated))
    }

    pub fn preserved_count(&self) -> usize {
        self.count_matching(|o| matches!(o, TaskOutcome::SkippedPreserved))
    }

    pub fn failure_count(&self) -> usize {
        self.count_matching(|o| matches!(o, TaskOutcome::Failed(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }

    fn count_matching(&self, predicate: impl Fn(&TaskOutcome) -> bool) -> usize {
        self.tables
            .values()
            .flat_map(|layers| layers.iter())
            .filter(|(_, outcome)| predicate(outcome))
            .count()
    }
}

/// Run-fatal error. Task-level failures never surface here; they are
/// recorded in the report instead.
#[derive(Debug)]
pub enum RunError {
    Config(String),
    Schema(SchemaError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Config(msg) => write!(f, "configuration error: {}", msg),
            RunError::Schema(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for RunError {}

/// Point-in-time view of the pipeline for health front-ends.
#[derive(Debug, Clone, Default)]
pub struct RunStatus {
    pub in_progress: bool,
    pub last_run_succeeded: Option<bool>,
}

/// Cheap shared handle the external HTTP/RPC health collaborators poll.
/// Carries no generation state beyond the two flags they need.
#[derive(Clone, Default)]
pub struct StatusProbe {
    inner: Arc<Mutex<RunStatus>>,
}

impl StatusProbe {
    pub fn snapshot(&self) -> RunStatus {
        self.inner.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn set_in_progress(&self) {
        if let Ok(mut status) = self.inner.lock() {
            status.in_progress = true;
        }
    }

    fn record_finished(&self, succeeded: bool) {
        if let Ok(mut status) = self.inner.lock() {
            status.in_progress = false;
            status.last_run_succeeded = Some(succeeded);
        }
    }
}

/// Cooperative run-level cancellation. Checked before each spawn and again
/// when a queued task acquires its worker-pool permit, so a cancel issued
/// mid-run stops every task that has not yet started. Tasks already past the
/// permit run to completion so no write is interrupted mid-rename.
#[derive(Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

/// Sequences introspection, prompting, synthesis, and materialization for
/// every selected table and layer.
pub struct Orchestrator<O> {
    config: Arc<GenerationConfig>,
    client: Arc<SynthesisClient<O>>,
    status: StatusProbe,
    cancel: CancelFlag,
}

impl<O: CodeOracle + 'static> Orchestrator<O> {
    pub fn new(config: GenerationConfig, client: SynthesisClient<O>) -> Self {
        Self {
            config: Arc::new(config),
            client: Arc::new(client),
            status: StatusProbe::default(),
            cancel: CancelFlag::default(),
        }
    }

    /// Handle for health front-ends.
    pub fn status_probe(&self) -> StatusProbe {
        self.status.clone()
    }

    /// Handle for run-level cancellation.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Full run: read the schema snapshot, then generate every layer of
    /// every selected table. Schema failure aborts before any write.
    pub async fn run(&self, introspector: &SchemaIntrospector) -> Result<GenerationReport, RunError> {
        let selection = self.config.selection();
        let schemas = introspector
            .snapshot(&selection)
            .await
            .map_err(RunError::Schema)?;
        Ok(self.run_with_schemas(schemas).await)
    }

    /// Generate from an already-read schema snapshot.
    ///
    /// Nothing past this point is run-fatal: every failure is scoped to its
    /// own task and recorded in the report.
    pub async fn run_with_schemas(&self, mut schemas: Vec<TableSchema>) -> GenerationReport {
        let started_at = Utc::now();
        self.status.set_in_progress();

        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        if schemas.is_empty() {
            tracing::warn!("table selection matched no tables; nothing to generate");
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_tasks));
        let mut join_set: JoinSet<(String, LayerKind, TaskOutcome)> = JoinSet::new();
        let mut dispatched: usize = 0;

        'dispatch: for schema in &schemas {
            let schema = Arc::new(schema.clone());
            for layer in LayerKind::ALL {
                if self.cancel.is_cancelled() {
                    tracing::info!("run cancelled, not dispatching further tasks");
                    break 'dispatch;
                }
                let config = Arc::clone(&self.config);
                let client = Arc::clone(&self.client);
                let schema = Arc::clone(&schema);
                let semaphore = Arc::clone(&semaphore);
                let cancel = self.cancel.clone();
                join_set.spawn(async move {
                    let outcome = match semaphore.acquire_owned().await {
                        // tasks still queued on the pool when the run is
                        // cancelled never reach the oracle or the writer
                        Ok(_permit) if cancel.is_cancelled() => {
                            TaskOutcome::Failed("run cancelled".to_string())
                        }
                        Ok(_permit) => run_task(&config, &client, &schema, layer).await,
                        Err(_) => TaskOutcome::Failed("worker pool closed".to_string()),
                    };
                    (schema.name.clone(), layer, outcome)
                });
                dispatched += 1;
            }
        }

        let mut outcomes: HashMap<(String, LayerKind), TaskOutcome> =
            HashMap::with_capacity(dispatched);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((table, layer, outcome)) => {
                    outcomes.insert((table, layer), outcome);
                }
                Err(e) => tracing::error!("generation task panicked: {}", e),
            }
        }

        // assemble in deterministic table order regardless of completion order
        let mut tables = IndexMap::with_capacity(schemas.len());
        for schema in &schemas {
            let layers = LayerKind::ALL
                .iter()
                .map(|&layer| {
                    let outcome = outcomes
                        .remove(&(schema.name.clone(), layer))
                        .unwrap_or_else(|| TaskOutcome::Failed("run cancelled".to_string()));
                    (layer, outcome)
                })
                .collect();
            tables.insert(schema.name.clone(), layers);
        }

        let report = GenerationReport {
            started_at,
            finished_at: Utc::now(),
            tables,
        };
        tracing::info!(
            "run finished: {} generated, {} preserved, {} failed",
            report.generated_count(),
            report.preserved_count(),
            report.failure_count()
        );
        self.status.record_finished(report.is_success());
        report
    }
}

/// One task: prompt, synthesize, materialize under the layer's write mode.
async fn run_task<O: CodeOracle>(
    config: &GenerationConfig,
    client: &SynthesisClient<O>,
    schema: &TableSchema,
    layer: LayerKind,
) -> TaskOutcome {
    let builder = PromptBuilder::new(config);
    let content = match builder.render(schema, layer) {
        LayerPayload::Verbatim(content) => content,
        LayerPayload::Oracle(request) => match client.synthesize(&request).await {
            Ok(code) => code,
            Err(err) => {
                tracing::warn!(
                    table = %schema.name,
                    layer = %layer,
                    "synthesis failed: {}",
                    err
                );
                return TaskOutcome::Failed(format!("synthesis: {}", err));
            }
        },
    };

    let path = layer.target_path(
        &config.project_root,
        &config.base_package,
        &config.module_name,
        &schema.name,
    );
    let written = match layer.write_mode() {
        WriteMode::Overwrite => fs_utils::write_overwrite_atomic(&path, &content).map(|_| true),
        WriteMode::Preserve => fs_utils::write_if_not_exists(&path, &content),
    };
    match written {
        Ok(true) => {
            tracing::info!(table = %schema.name, layer = %layer, "wrote {}", path.display());
            TaskOutcome::Generated
        }
        Ok(false) => {
            tracing::info!(
                table = %schema.name,
                layer = %layer,
                "{} already exists, preserved",
                path.display()
            );
            TaskOutcome::SkippedPreserved
        }
        Err(err) => {
            tracing::warn!(
                table = %schema.name,
                layer = %layer,
                "write to {} failed: {}",
                path.display(),
                err
            );
            TaskOutcome::Failed(format!("write {}: {}", path.display(), err))
        }
    }
}
