//! The per-process session object.
//!
//! `WorkflowContext` is built once from a `WorkflowConfig` and owns the phase
//! engine, artifact store, retry state, router and failure manager. Analyzers,
//! fixers and phase implementations declared as commands in phasegate.toml
//! are registered first; anything added through the builder replaces them.

use crate::artifacts::ArtifactStore;
use crate::failure::{CommandFixer, ErrorCategory, FailureManager, Fixer, FixerRegistry, RetryStateStore};
use crate::hooks::{
    CheckRegistry, Checkpoint, CommandCheck, CommandExecutor, HookContext, HookResult, HookRouter,
    QualityCheck,
};
use crate::phase::{CommandPhaseImplementation, Phase, PhaseEngine, PhaseImplementation, TransitionRules};
use crate::workflow_config::WorkflowConfig;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct WorkflowContext {
    pub config: WorkflowConfig,
    pub engine: Arc<PhaseEngine>,
    pub store: Arc<ArtifactStore>,
    pub retry_state: Arc<RetryStateStore>,
    pub router: HookRouter,
    pub failures: FailureManager,
}

pub struct WorkflowContextBuilder {
    config: WorkflowConfig,
    checks: Vec<(String, Arc<dyn QualityCheck>)>,
    fixers: Vec<(ErrorCategory, Arc<dyn Fixer>)>,
    implementations: Vec<(Phase, Arc<dyn PhaseImplementation>)>,
}

impl WorkflowContextBuilder {
    pub fn check(mut self, name: impl Into<String>, check: Arc<dyn QualityCheck>) -> Self {
        self.checks.push((name.into(), check));
        self
    }

    pub fn fixer(mut self, category: ErrorCategory, fixer: Arc<dyn Fixer>) -> Self {
        self.fixers.push((category, fixer));
        self
    }

    pub fn implementation(mut self, phase: Phase, implementation: Arc<dyn PhaseImplementation>) -> Self {
        self.implementations.push((phase, implementation));
        self
    }

    pub fn build(self) -> Result<WorkflowContext> {
        let config = self.config;
        let toml = &config.toml;
        let executor = CommandExecutor::new(&config.project_dir);

        let rules = if config.enforce_gates() {
            TransitionRules::standard()
        } else {
            debug!("Gate enforcement disabled; only phase order is checked");
            TransitionRules::sequence_only()
        };
        let mut engine = PhaseEngine::new(&config.data_dir, rules);
        for (phase, implementation) in &toml.phases.implementations {
            engine.register_implementation(
                *phase,
                Arc::new(CommandPhaseImplementation::new(
                    implementation.command.clone(),
                    executor.clone(),
                    Duration::from_secs(implementation.timeout_secs),
                )),
            );
            if let Some(ref value) = implementation.config {
                let value = serde_json::to_value(value)
                    .with_context(|| format!("Invalid config for {} implementation", phase))?;
                engine.set_implementation_config(*phase, value);
            }
        }
        for (phase, implementation) in self.implementations {
            engine.register_implementation(phase, implementation);
        }
        let engine = Arc::new(engine);

        let store = Arc::new(ArtifactStore::new(
            config.artifacts_dir(),
            toml.artifacts.compression_threshold_bytes,
        ));
        let retry_state = Arc::new(RetryStateStore::new(&config.data_dir, toml.retry.state_ttl_secs));

        let mut fixers = FixerRegistry::new();
        for (category, fixer) in &toml.fixers {
            fixers.register(
                *category,
                Arc::new(CommandFixer::new(
                    fixer.command.clone(),
                    executor.clone(),
                    Duration::from_secs(fixer.timeout_secs),
                )),
            );
        }
        for (category, fixer) in self.fixers {
            fixers.register(category, fixer);
        }
        let fixers = Arc::new(fixers);

        let mut checks = CheckRegistry::new();
        for (name, analyzer) in &toml.checks.analyzers {
            let timeout = Duration::from_secs(analyzer.timeout_secs);
            checks.register(
                name.clone(),
                Arc::new(CommandCheck::new(
                    name.clone(),
                    analyzer.command.clone(),
                    executor.clone(),
                    timeout,
                )),
            );
        }
        for (name, check) in self.checks {
            checks.register(name, check);
        }

        let router = HookRouter::new(
            &config.project_dir,
            config.logs_dir(),
            engine.clone(),
            store.clone(),
            retry_state.clone(),
            fixers.clone(),
        )?
        .with_checkpoint_map(config.checkpoint_map())
        .with_hooks(toml.hooks.clone())
        .with_checks(checks)
        .with_settings(&toml.checks)?
        .with_check_reports(toml.artifacts.store_check_reports)
        .with_skip(config.skip_checks());

        let failures = FailureManager::new(
            toml.hooks.clone(),
            retry_state.clone(),
            fixers,
            config.logs_dir(),
            config.reports_dir(),
        );

        Ok(WorkflowContext {
            config,
            engine,
            store,
            retry_state,
            router,
            failures,
        })
    }
}

impl WorkflowContext {
    pub fn builder(config: WorkflowConfig) -> WorkflowContextBuilder {
        WorkflowContextBuilder {
            config,
            checks: Vec::new(),
            fixers: Vec::new(),
            implementations: Vec::new(),
        }
    }

    pub fn new(config: WorkflowConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Run a checkpoint through the router with the hook's failure strategy.
    pub async fn run_hook(&self, checkpoint: Checkpoint, context: &HookContext) -> HookResult {
        self.failures.execute(&self.router, checkpoint, context).await
    }
}
