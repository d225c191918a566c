//! Fleet-wide fan-out of cluster operations
//!
//! Every operation spawns one task per cluster into a [`JoinSet`] and drains
//! it completely before returning, so no task outlives the call. Fleet
//! creation runs in two phases: every cluster is brought up before any is
//! finalized.

use crate::config::{ClusterSpec, CreateFlags, Planner};
use crate::fleet::lifecycle::{ClusterLifecycle, FleetContext};
use crate::install::{DebugWorkload, debug};
use crate::k8s::kubeconfig::KubeconfigPaths;
use crate::utils::errors::{ArmadaError, ArmadaResult};
use crate::utils::logger::LoggingConfig;
use crate::utils::progress::{ClusterProgress, FleetProgress};
use futures::future::try_join_all;
use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::task::{self, JoinSet};

/// Outcome of a successful `create clusters`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateReport {
    /// Clusters brought up by this call
    pub created: Vec<String>,
    /// Requested clusters that already existed
    pub skipped: Vec<String>,
    /// Host kubeconfig of every cluster known on disk
    pub kubeconfigs: Vec<std::path::PathBuf>,
}

impl CreateReport {
    /// `export KUBECONFIG=...` line merging every host kubeconfig
    pub fn export_hint(&self) -> Option<String> {
        if self.kubeconfigs.is_empty() {
            return None;
        }
        let joined = self
            .kubeconfigs
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        Some(format!("export KUBECONFIG={}", joined))
    }
}

/// Per-cluster results of a best-effort batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, ArmadaError)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct FleetOrchestrator {
    lifecycle: ClusterLifecycle,
    planner: Planner,
    progress: FleetProgress,
}

impl FleetOrchestrator {
    /// Spinners are drawn only when requested and logs are not verbose
    pub fn new(ctx: Arc<FleetContext>, planner: Planner, logging: LoggingConfig, show_progress: bool) -> Self {
        Self {
            lifecycle: ClusterLifecycle::new(ctx),
            planner,
            progress: FleetProgress::new(show_progress && !logging.is_verbose()),
        }
    }

    fn ctx(&self) -> &FleetContext {
        self.lifecycle.context()
    }

    /// Specs for every requested index whose cluster does not exist yet
    pub async fn plan_fleet(&self, flags: &CreateFlags) -> ArmadaResult<(Vec<ClusterSpec>, Vec<String>)> {
        let existing = self.ctx().engine.list_clusters().await?;
        let mut specs = Vec::new();
        let mut skipped = Vec::new();

        for index in 1..=flags.num_clusters {
            let name = self.planner.cluster_name(index);
            if existing.contains(&name) {
                crate::log_info!("✔ Cluster {} already exists, skipping its creation", name);
                skipped.push(name);
                continue;
            }
            specs.push(self.planner.plan(index, flags)?);
        }

        Ok((specs, skipped))
    }

    /// Plan, bring up and finalize the fleet; the first failure aborts the call
    pub async fn create_fleet(&self, flags: &CreateFlags) -> ArmadaResult<CreateReport> {
        let (specs, skipped) = self.plan_fleet(flags).await?;

        if specs.is_empty() {
            crate::log_info!("No clusters to create");
        } else {
            crate::log_info!("Creating {} cluster(s) with {} CNI", specs.len(), flags.cni);

            self.run_phase("Creating", &specs, |lifecycle, spec, progress| async move {
                lifecycle.bring_up(&spec, &progress).await
            })
            .await?;

            self.run_phase("Finalizing", &specs, |lifecycle, spec, progress| async move {
                lifecycle.finalize(&spec, &progress).await
            })
            .await?;
        }

        let kubeconfigs = self.repair_kubeconfigs().await?;
        Ok(CreateReport {
            created: specs.into_iter().map(|s| s.name).collect(),
            skipped,
            kubeconfigs: kubeconfigs.into_iter().map(|p| p.host).collect(),
        })
    }

    /// Re-derive missing kubeconfig variants of every known cluster
    ///
    /// Failures are logged, not returned; only complete clusters are reported.
    pub async fn repair_kubeconfigs(&self) -> ArmadaResult<Vec<KubeconfigPaths>> {
        let ctx = self.ctx();
        let mut complete = Vec::new();

        for name in ctx.store.known_clusters()? {
            if !ctx.kubeconfigs.is_complete(&name) {
                let raw = ctx.store.layout().raw_kubeconfig(&name);
                crate::log_info!("Kubeconfigs for {} are missing, deriving them again", name);
                if let Err(e) = self.lifecycle.derive_kubeconfigs(&name, &raw).await {
                    crate::log_warn!("Could not repair kubeconfigs for {}: {}", name, e);
                    continue;
                }
            }
            complete.push(ctx.kubeconfigs.paths(&name));
        }

        Ok(complete)
    }

    /// Explicit names, or every cluster known on disk
    pub fn resolve_targets(&self, requested: &[String]) -> ArmadaResult<Vec<String>> {
        if requested.is_empty() {
            self.ctx().store.known_clusters()
        } else {
            Ok(requested.to_vec())
        }
    }

    /// Delete clusters and their files; failures are collected per cluster
    pub async fn destroy_fleet(&self, names: &[String]) -> BatchReport {
        self.run_batch("Deleting", names, |lifecycle, name, _progress| async move {
            let ctx = lifecycle.context();
            let raw = ctx.store.layout().raw_kubeconfig(&name);
            ctx.engine.delete(&name, &raw).await?;
            ctx.store.remove(&name)
        })
        .await
    }

    /// Apply a debug workload to every cluster and wait for it to run
    pub async fn deploy_workload(&self, names: &[String], workload: DebugWorkload) -> ArmadaResult<()> {
        self.run_batch("Deploying", names, move |lifecycle, name, progress| async move {
            progress.set_step(&format!("{}: deploying {}", name, workload.daemonset_name()));
            let session = lifecycle.connect(&name).await?;
            debug::deploy(&session, &lifecycle.context().renderer, workload).await
        })
        .await
        .into_first_error()
    }

    /// Export node logs of every cluster into a freshly cleared logs directory
    pub async fn export_logs(&self, names: &[String]) -> ArmadaResult<()> {
        let logs_root = self.ctx().store.layout().logs_root();
        match fs::remove_dir_all(&logs_root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ArmadaError::io(&logs_root, e)),
        }

        self.run_batch("Exporting logs of", names, |lifecycle, name, _progress| async move {
            let dir = lifecycle.context().store.layout().logs_dir(&name);
            lifecycle.context().engine.export_logs(&name, &dir).await
        })
        .await
        .into_first_error()
    }

    /// Load locally present images into every cluster
    pub async fn load_images(&self, names: &[String], images: &[String]) -> ArmadaResult<()> {
        let inspector = &self.ctx().inspector;
        let checks = images.iter().map(|image| async move {
            inspector.image_exists(image).await.map(|exists| (image, exists))
        });
        for (image, exists) in try_join_all(checks).await? {
            if !exists {
                return Err(ArmadaError::runtime(
                    "docker",
                    format!("image {} not found locally", image),
                ));
            }
        }

        let images = Arc::new(images.to_vec());
        self.run_batch("Loading images into", names, move |lifecycle, name, progress| {
            let images = Arc::clone(&images);
            async move {
                for image in images.iter() {
                    progress.set_step(&format!("{}: loading {}", name, image));
                    lifecycle.context().engine.load_image(&name, image).await?;
                }
                Ok(())
            }
        })
        .await
        .into_first_error()
    }

    /// One task per spec; joins all of them, then reports the first failure
    async fn run_phase<F, Fut, T>(&self, operation: &str, specs: &[ClusterSpec], step: F) -> ArmadaResult<Vec<T>>
    where
        F: Fn(ClusterLifecycle, ClusterSpec, ClusterProgress) -> Fut,
        Fut: Future<Output = ArmadaResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut tasks = ClusterTasks::new();
        for spec in specs {
            let progress = self.progress.cluster(operation, &spec.name);
            let task = step(self.lifecycle.clone(), spec.clone(), progress.clone());
            tasks.spawn(&spec.name, track(spec.name.clone(), progress, task));
        }

        let mut outputs = Vec::with_capacity(specs.len());
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, output)) => outputs.push(output),
                Err((name, e)) => {
                    crate::log_error!("{} cluster {} failed: {}", operation, name, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(outputs),
        }
    }

    /// One task per cluster name; every outcome is kept
    async fn run_batch<F, Fut>(&self, operation: &str, names: &[String], step: F) -> BatchReport
    where
        F: Fn(ClusterLifecycle, String, ClusterProgress) -> Fut,
        Fut: Future<Output = ArmadaResult<()>> + Send + 'static,
    {
        let mut tasks = ClusterTasks::new();
        for name in names {
            let progress = self.progress.cluster(operation, name);
            let task = step(self.lifecycle.clone(), name.clone(), progress.clone());
            tasks.spawn(name, track(name.clone(), progress, task));
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, ())) => report.succeeded.push(name),
                Err((name, e)) => {
                    crate::log_error!("{} cluster {} failed: {}", operation, name, e);
                    report.failed.push((name, e));
                }
            }
        }

        report.succeeded.sort();
        report
    }
}

impl BatchReport {
    fn into_first_error(self) -> ArmadaResult<()> {
        match self.failed.into_iter().next() {
            Some((_, e)) => Err(e),
            None => Ok(()),
        }
    }
}

type TaskOutput<T> = (String, ArmadaResult<T>);

async fn track<T>(
    name: String,
    progress: ClusterProgress,
    task: impl Future<Output = ArmadaResult<T>>,
) -> TaskOutput<T> {
    let result = task.await;
    match &result {
        Ok(_) => progress.finish_success(&name),
        Err(e) => progress.finish_error(&format!("{}: {}", name, e)),
    }
    (name, result)
}

/// Per-cluster tasks of one fan-out, remembering which cluster each task serves
struct ClusterTasks<T> {
    set: JoinSet<TaskOutput<T>>,
    names: HashMap<task::Id, String>,
}

impl<T: Send + 'static> ClusterTasks<T> {
    fn new() -> Self {
        Self {
            set: JoinSet::new(),
            names: HashMap::new(),
        }
    }

    fn spawn(&mut self, name: &str, task: impl Future<Output = TaskOutput<T>> + Send + 'static) {
        let handle = self.set.spawn(task);
        self.names.insert(handle.id(), name.to_string());
    }

    /// Next finished task; a panicked or cancelled one is reported under its cluster
    async fn join_next(&mut self) -> Option<Result<(String, T), (String, ArmadaError)>> {
        let joined = self.set.join_next_with_id().await?;
        Some(match joined {
            Ok((id, (name, result))) => {
                self.names.remove(&id);
                match result {
                    Ok(output) => Ok((name, output)),
                    Err(e) => Err((name, e)),
                }
            }
            Err(e) => {
                let name = self
                    .names
                    .remove(&e.id())
                    .unwrap_or_else(|| "unknown".to_string());
                Err((
                    name.clone(),
                    ArmadaError::Task {
                        cluster: name,
                        reason: e.to_string(),
                    },
                ))
            }
        })
    }
}
