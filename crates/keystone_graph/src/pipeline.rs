//! Dependency-ordered stage pipeline.
//!
//! Stages name the stages they depend on; [`StagePipeline::resolve`] orders
//! them with the same [`ExecutionGraph`] batching used for recovery steps.
//! A run configures every stage, executes every stage, then disposes the
//! configured ones in reverse order whether or not anything failed.

use crate::graph::ExecutionGraph;
use std::collections::HashMap;

/// Pipeline result type
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failure reported by a stage
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StageError {
    /// What went wrong
    pub message: String,
}

impl StageError {
    /// Create a stage error
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Pipeline resolution or run failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// Stage dependencies form a cycle
    #[error("Stage cycle among: {}", .stages.join(", "))]
    Cycle {
        /// Stages that could not be ordered
        stages: Vec<String>,
    },

    /// A stage depends on a stage that was never registered
    #[error("Stage {stage} depends on unknown stage {dependency}")]
    UnknownDependency {
        /// Declaring stage
        stage: String,
        /// Missing dependency
        dependency: String,
    },

    /// Two stages share a name
    #[error("Duplicate stage: {name}")]
    DuplicateStage {
        /// Repeated name
        name: String,
    },

    /// A stage hook returned an error
    #[error("Stage {stage} failed during {hook}: {source}")]
    StageFailed {
        /// Failing stage
        stage: String,
        /// `configure` or `execute`
        hook: &'static str,
        /// Stage error
        #[source]
        source: StageError,
    },
}

/// One unit of work over a shared context
pub trait Stage<C>: Send {
    /// Unique stage name
    fn name(&self) -> &str;

    /// Names of stages that must run first
    fn depends_on(&self) -> Vec<String> {
        Vec::new()
    }

    /// Prepare before any stage executes
    ///
    /// # Errors
    ///
    /// Returns error to abort the run
    fn configure(&mut self, _ctx: &mut C) -> Result<(), StageError> {
        Ok(())
    }

    /// Do the work
    ///
    /// # Errors
    ///
    /// Returns error to abort the run
    fn execute(&mut self, ctx: &mut C) -> Result<(), StageError>;

    /// Release anything acquired in `configure`
    fn dispose(&mut self, _ctx: &mut C) {}
}

/// Ordered collection of stages
pub struct StagePipeline<C> {
    stages: Vec<Box<dyn Stage<C>>>,
}

impl<C> Default for StagePipeline<C> {
    fn default() -> Self {
        Self { stages: Vec::new() }
    }
}

impl<C> std::fmt::Debug for StagePipeline<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePipeline")
            .field("stages", &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl<C> StagePipeline<C> {
    /// Create an empty pipeline
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage
    #[must_use]
    pub fn with_stage(mut self, stage: impl Stage<C> + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Register a boxed stage
    pub fn push(&mut self, stage: Box<dyn Stage<C>>) {
        self.stages.push(stage);
    }

    /// Number of registered stages
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether no stages are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in run order
    ///
    /// # Errors
    ///
    /// Returns error on duplicate names, unknown dependencies or cycles
    pub fn resolve(&self) -> PipelineResult<Vec<String>> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut graph: ExecutionGraph<String> = ExecutionGraph::new();

        for (i, stage) in self.stages.iter().enumerate() {
            let name = stage.name().to_string();
            if index.insert(name.clone(), i).is_some() {
                return Err(PipelineError::DuplicateStage { name });
            }
            graph.add_node(name);
        }

        for stage in &self.stages {
            for dependency in stage.depends_on() {
                graph
                    .add_edge(dependency.clone(), stage.name().to_string())
                    .map_err(|_| PipelineError::UnknownDependency {
                        stage: stage.name().to_string(),
                        dependency,
                    })?;
            }
        }

        if graph.detect_cycle() {
            return Err(PipelineError::Cycle {
                stages: graph.blocked_nodes(),
            });
        }

        Ok(graph.linear_order())
    }

    /// Resolve, then configure, execute and dispose every stage
    ///
    /// # Errors
    ///
    /// Returns the resolution error or the first hook failure; disposal
    /// still runs for every stage that configured successfully
    pub fn run(&mut self, ctx: &mut C) -> PipelineResult<()> {
        let order = self.resolve()?;
        let positions: HashMap<&str, usize> = self
            .stages
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name(), i))
            .collect();
        let order: Vec<usize> = order
            .iter()
            .filter_map(|name| positions.get(name.as_str()).copied())
            .collect();

        let mut configured = Vec::with_capacity(order.len());
        let mut outcome = Ok(());

        for &i in &order {
            let stage = &mut self.stages[i];
            if let Err(source) = stage.configure(ctx) {
                outcome = Err(PipelineError::StageFailed {
                    stage: stage.name().to_string(),
                    hook: "configure",
                    source,
                });
                break;
            }
            configured.push(i);
        }

        if outcome.is_ok() {
            for &i in &order {
                let stage = &mut self.stages[i];
                tracing::trace!(stage = stage.name(), "executing stage");
                if let Err(source) = stage.execute(ctx) {
                    outcome = Err(PipelineError::StageFailed {
                        stage: stage.name().to_string(),
                        hook: "execute",
                        source,
                    });
                    break;
                }
            }
        }

        for &i in configured.iter().rev() {
            self.stages[i].dispose(ctx);
        }

        if let Err(err) = &outcome {
            tracing::debug!(error = %err, "stage pipeline failed");
        }
        outcome
    }
}
