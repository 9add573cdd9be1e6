//! Loading a simulation study from disk.
//!
//! File locations are path templates relative to a base directory, with
//! `{rep}` replaced by the replicate number and `{chain}` by the chain id:
//!
//! ```text
//! reps/rep{rep}/run{chain}/yule-n100-{rep}.log   posterior samples
//! reps/rep{rep}/yule-n100-{rep}.log              generation log (true values)
//! reps/rep{rep}/yule-n100-{rep}.xml              generating tree
//! ```
//!
//! Replicates are read concurrently. A file that cannot be read or parsed,
//! or a column that is not in it, is logged and left out; the engine then
//! reports the gap as missing data for the parameters it affects.

use super::newick::tree_from_document;
use super::tracelog::TraceLog;
use crate::analysis::DatasetTables;
use crate::models::{ChainId, Parameter, ReplicateId, TreeStatistic, TruthSource};
use anyhow::{bail, Result};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where and how to load the inputs.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Directory the templates are relative to.
    pub base_dir: PathBuf,
    /// Template of the per-chain posterior logs.
    pub posterior_log: String,
    /// Template of the generation log holding true values in its first row.
    pub truth_log: Option<String>,
    /// Template of the file holding the generating tree (Newick or XML).
    pub truth_tree: Option<String>,
    /// Id of the XML element carrying the `newick` attribute.
    pub tree_node_id: String,
    /// Maximum number of replicates read at once.
    pub concurrency: usize,
    /// Draw a progress bar while loading.
    pub show_progress: bool,
}

impl From<&crate::config::InputsConfig> for LoadConfig {
    fn from(config: &crate::config::InputsConfig) -> Self {
        Self {
            base_dir: PathBuf::from(&config.base_dir),
            posterior_log: config.posterior_log.clone(),
            truth_log: config.truth_log.clone(),
            truth_tree: config.truth_tree.clone(),
            tree_node_id: config.tree_node_id.clone(),
            concurrency: config.concurrency,
            show_progress: false,
        }
    }
}

/// Substitute `{rep}` and `{chain}` in a path template.
pub fn render_template(template: &str, replicate: ReplicateId, chain: Option<&ChainId>) -> String {
    let path = template.replace("{rep}", &replicate.to_string());
    match chain {
        Some(chain) => path.replace("{chain}", &chain.0),
        None => path,
    }
}

/// Reads posterior logs and true values for every replicate.
pub struct DatasetLoader {
    config: LoadConfig,
    parameters: Vec<Parameter>,
    replicates: Vec<ReplicateId>,
    chains: Vec<ChainId>,
}

impl DatasetLoader {
    /// Create a loader, checking that the templates can serve the parameters.
    pub fn new(
        config: LoadConfig,
        parameters: Vec<Parameter>,
        replicate_count: u32,
        chains: Vec<ChainId>,
    ) -> Result<Self> {
        if replicate_count > 1 && !config.posterior_log.contains("{rep}") {
            bail!("posterior_log template must contain {{rep}}");
        }
        // Every chain reading the same file would pool duplicated samples.
        if chains.len() > 1 && !config.posterior_log.contains("{chain}") {
            bail!("posterior_log template must contain {{chain}} when pooling several chains");
        }

        let wants_log = parameters.iter().any(|p| matches!(p.truth, TruthSource::Log { .. }));
        let wants_tree = parameters.iter().any(|p| matches!(p.truth, TruthSource::Tree { .. }));

        for (needed, template, key) in [
            (wants_log, &config.truth_log, "truth_log"),
            (wants_tree, &config.truth_tree, "truth_tree"),
        ] {
            match template {
                None if needed => bail!("{} template is required by the configured parameters", key),
                Some(t) if t.contains("{chain}") => bail!("{} template cannot depend on {{chain}}", key),
                Some(t) if needed && replicate_count > 1 && !t.contains("{rep}") => {
                    bail!("{} template must contain {{rep}}", key)
                }
                _ => {}
            }
        }

        Ok(Self {
            config,
            parameters,
            replicates: ReplicateId::range(replicate_count),
            chains,
        })
    }

    /// Load every replicate into in-memory tables.
    ///
    /// Gaps are left for the engine to report; only a study with no sample
    /// sequence at all is an error.
    pub async fn load(&self) -> Result<DatasetTables> {
        info!(
            "Loading {} replicates x {} chains from {}",
            self.replicates.len(),
            self.chains.len(),
            self.config.base_dir.display()
        );

        let progress = self.progress_bar();
        let mut tables = DatasetTables::new();

        let mut loads = stream::iter(self.replicates.iter().copied())
            .map(|replicate| self.load_replicate(replicate))
            .buffer_unordered(self.config.concurrency.max(1));

        while let Some(replicate_tables) = loads.next().await {
            tables.merge(replicate_tables);
            if let Some(pb) = &progress {
                pb.inc(1);
            }
        }

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        info!(
            "Loaded {} sample sequences and {} true values",
            tables.sequence_count(),
            tables.true_value_count()
        );

        if tables.sequence_count() == 0 {
            bail!(
                "no posterior samples found under {} (template '{}')",
                self.config.base_dir.display(),
                self.config.posterior_log
            );
        }
        Ok(tables)
    }

    fn progress_bar(&self) -> Option<ProgressBar> {
        if !self.config.show_progress {
            return None;
        }
        let pb = ProgressBar::new(self.replicates.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} replicates ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Some(pb)
    }

    async fn load_replicate(&self, replicate: ReplicateId) -> DatasetTables {
        let mut tables = DatasetTables::new();

        let chain_logs = join_all(self.chains.iter().map(|chain| {
            let path = self.path(&self.config.posterior_log, replicate, Some(chain));
            async move { (chain, read_trace_log(&path).await) }
        }))
        .await;

        for (chain, log) in chain_logs {
            let Some(log) = log else { continue };
            debug!(
                "Replicate {} chain {}: {} samples",
                replicate,
                chain,
                log.row_count()
            );
            for parameter in &self.parameters {
                match log.column(&parameter.name) {
                    Some(values) => tables.insert_samples(
                        &parameter.name,
                        replicate,
                        chain.clone(),
                        values.to_vec(),
                    ),
                    None => warn!(
                        "Replicate {} chain {}: no column '{}' in posterior log (columns: {})",
                        replicate,
                        chain,
                        parameter.name,
                        log.headers().join(", ")
                    ),
                }
            }
        }

        self.load_log_truths(replicate, &mut tables).await;
        self.load_tree_truths(replicate, &mut tables).await;

        debug!("Replicate {} loaded", replicate);
        tables
    }

    async fn load_log_truths(&self, replicate: ReplicateId, tables: &mut DatasetTables) {
        let Some(template) = &self.config.truth_log else { return };
        let columns: Vec<(&str, &str)> = self
            .parameters
            .iter()
            .filter_map(|p| p.truth_column().map(|c| (p.name.as_str(), c)))
            .collect();
        if columns.is_empty() {
            return;
        }

        let path = self.path(template, replicate, None);
        let Some(log) = read_trace_log(&path).await else { return };

        for (name, column) in columns {
            match log.first_value(column) {
                Some(value) => tables.insert_true_value(name, replicate, value),
                None => warn!(
                    "Replicate {}: no value for column '{}' in {}",
                    replicate,
                    column,
                    path.display()
                ),
            }
        }
    }

    async fn load_tree_truths(&self, replicate: ReplicateId, tables: &mut DatasetTables) {
        let Some(template) = &self.config.truth_tree else { return };
        let statistics: Vec<(&str, TreeStatistic)> = self
            .parameters
            .iter()
            .filter_map(|p| match p.truth {
                TruthSource::Tree { statistic } => Some((p.name.as_str(), statistic)),
                TruthSource::Log { .. } => None,
            })
            .collect();
        if statistics.is_empty() {
            return;
        }

        let path = self.path(template, replicate, None);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                return;
            }
        };
        let tree = match tree_from_document(&text, &self.config.tree_node_id) {
            Ok(tree) => tree,
            Err(e) => {
                warn!("Cannot parse tree in {}: {}", path.display(), e);
                return;
            }
        };

        debug!(
            "Replicate {}: generating tree with {} taxa",
            replicate,
            tree.leaf_labels().len()
        );
        for (name, statistic) in statistics {
            tables.insert_true_value(name, replicate, tree.statistic(statistic));
        }
    }

    fn path(&self, template: &str, replicate: ReplicateId, chain: Option<&ChainId>) -> PathBuf {
        self.config
            .base_dir
            .join(render_template(template, replicate, chain))
    }
}

async fn read_trace_log(path: &Path) -> Option<TraceLog> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Cannot read {}: {}", path.display(), e);
            return None;
        }
    };
    match TraceLog::parse(&text) {
        Ok(log) => Some(log),
        Err(e) => {
            warn!("Cannot parse {}: {}", path.display(), e);
            None
        }
    }
}
