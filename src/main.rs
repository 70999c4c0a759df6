//! CLI entry point for the content pipeline engine.
//!
//! Drives the vector index outside the host system: a JSON corpus file
//! stands in for the embedding store, and a JSON job file stands in for the
//! queue table. Commands: init, config, cluster, similar, queue.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use draftmill::vector::{
    CentroidStore, ClusterId, EmbeddingSource, SearchParams, TopicId, VectorCodec,
    VectorDimension, VectorError, VectorPipeline,
};
use draftmill::{Job, JobStore, MemoryJobStore, Settings};

#[derive(Parser)]
#[command(name = "draftmill", version, about = "Content pipeline engine: clustering, similarity search, and queue tooling")]
struct Cli {
    /// Path to a custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up the .draftmill workspace directory
    Init {
        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// Run a full clustering pass over a corpus file
    Cluster {
        /// JSON corpus file of transport-encoded embeddings
        #[arg(short, long)]
        input: PathBuf,

        /// Override the derived cluster count
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Find the topics most similar to one topic
    Similar {
        /// JSON corpus file of transport-encoded embeddings
        #[arg(short, long)]
        input: PathBuf,

        /// Query topic id
        id: u64,

        /// Maximum number of results
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Inspect or repair a queue snapshot
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Print job counts by status and type
    Status {
        /// JSON file of job rows
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Reset all failed jobs to pending
    RequeueFailed {
        /// JSON file of job rows (rewritten in place)
        #[arg(short, long)]
        input: PathBuf,
    },
}

/// One corpus row as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CorpusEntry {
    id: u64,
    /// Transport-encoded embedding (base64-wrapped f32 LE)
    vector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cluster: Option<u32>,
    /// Eligibility flag for similarity candidates
    #[serde(default = "default_published")]
    published: bool,
}

fn default_published() -> bool {
    true
}

/// Embedding source backed by a decoded corpus file.
struct JsonCorpusSource {
    rows: Mutex<Vec<(TopicId, Vec<f32>, Option<ClusterId>, bool)>>,
}

impl JsonCorpusSource {
    fn load(path: &Path, codec: &VectorCodec) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read corpus file {}", path.display()))?;
        let entries: Vec<CorpusEntry> =
            serde_json::from_str(&content).context("corpus file is not valid JSON")?;

        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = TopicId::new(entry.id)
                .with_context(|| format!("corpus entry has invalid topic id {}", entry.id))?;
            let vector = codec
                .decode(&entry.vector)
                .with_context(|| format!("corpus entry {} has a bad vector", entry.id))?;
            rows.push((id, vector, entry.cluster.map(ClusterId::new), entry.published));
        }
        Ok(Self {
            rows: Mutex::new(rows),
        })
    }

    fn save(&self, path: &Path, codec: &VectorCodec) -> Result<()> {
        let rows = self.rows.lock();
        let mut entries = Vec::with_capacity(rows.len());
        for (id, vector, cluster, published) in rows.iter() {
            entries.push(CorpusEntry {
                id: id.get(),
                vector: codec.encode(vector).context("cannot re-encode vector")?,
                cluster: cluster.map(|c| c.get()),
                published: *published,
            });
        }
        let content = serde_json::to_string_pretty(&entries)?;
        std::fs::write(path, content)
            .with_context(|| format!("cannot write corpus file {}", path.display()))?;
        Ok(())
    }
}

impl EmbeddingSource for JsonCorpusSource {
    fn fetch_all(&self) -> Result<Vec<(TopicId, Vec<f32>)>, VectorError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .map(|(id, v, _, _)| (*id, v.clone()))
            .collect())
    }

    fn fetch_unclustered(&self) -> Result<Vec<(TopicId, Vec<f32>)>, VectorError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|(_, _, cluster, _)| cluster.is_none())
            .map(|(id, v, _, _)| (*id, v.clone()))
            .collect())
    }

    fn fetch_vector(&self, id: TopicId) -> Result<Option<Vec<f32>>, VectorError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .find(|(row_id, _, _, _)| *row_id == id)
            .map(|(_, v, _, _)| v.clone()))
    }

    fn fetch_candidates(
        &self,
        clusters: &[ClusterId],
    ) -> Result<Vec<(TopicId, Vec<f32>)>, VectorError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|(_, _, cluster, published)| {
                *published && cluster.map(|c| clusters.contains(&c)).unwrap_or(false)
            })
            .map(|(id, v, _, _)| (*id, v.clone()))
            .collect())
    }

    fn persist_assignment(&self, id: TopicId, cluster: ClusterId) -> Result<(), VectorError> {
        let mut rows = self.rows.lock();
        let row = rows
            .iter_mut()
            .find(|(row_id, _, _, _)| *row_id == id)
            .ok_or(VectorError::EmbeddingNotFound(id))?;
        row.2 = Some(cluster);
        Ok(())
    }
}

fn load_settings(config: Option<&PathBuf>) -> Result<Settings> {
    let settings = match config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    settings.map_err(|e| anyhow::anyhow!("failed to load settings: {e}"))
}

fn load_jobs(path: &Path) -> Result<Vec<Job>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read queue file {}", path.display()))?;
    serde_json::from_str(&content).context("queue file is not valid JSON")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            let path = Settings::init_workspace(force).map_err(|e| anyhow::anyhow!(e))?;
            println!("Initialized workspace settings at {}", path.display());
        }

        Commands::Config => {
            let settings = load_settings(cli.config.as_ref())?;
            println!("{}", toml::to_string_pretty(&settings)?);
        }

        Commands::Cluster { input, k } => {
            let settings = load_settings(cli.config.as_ref())?;
            let dimension = VectorDimension::new(settings.vector.dimension)
                .map_err(|e| anyhow::anyhow!("invalid configured dimension: {e}"))?;
            let codec = VectorCodec::new(dimension);

            let source = JsonCorpusSource::load(&input, &codec)?;
            let pipeline = VectorPipeline::new(
                source,
                CentroidStore::new(&settings.vector.centroid_path),
                dimension,
                settings.pipeline_options(),
            );

            let summary = pipeline
                .trigger_clustering(k)
                .context("clustering run failed")?;
            pipeline.source().save(&input, &codec)?;

            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::Similar { input, id, limit } => {
            let settings = load_settings(cli.config.as_ref())?;
            let dimension = VectorDimension::new(settings.vector.dimension)
                .map_err(|e| anyhow::anyhow!("invalid configured dimension: {e}"))?;
            let codec = VectorCodec::new(dimension);

            let Some(query_id) = TopicId::new(id) else {
                bail!("topic id must be non-zero");
            };

            let source = JsonCorpusSource::load(&input, &codec)?;
            let pipeline = VectorPipeline::new(
                source,
                CentroidStore::new(&settings.vector.centroid_path),
                dimension,
                settings.pipeline_options(),
            );

            let params = SearchParams {
                limit: limit.unwrap_or(settings.search.default_limit),
                candidate_clusters: settings.search.candidate_clusters,
                similarity_threshold: settings.search.similarity_threshold,
            };
            let results = pipeline
                .search(query_id, &params)
                .context("similarity search failed")?;

            println!("{}", serde_json::to_string_pretty(&results)?);
        }

        Commands::Queue { command } => match command {
            QueueCommands::Status { input } => {
                let store = MemoryJobStore::from_jobs(load_jobs(&input)?);
                let counts = store
                    .counts()
                    .map_err(|e| anyhow::anyhow!("cannot compute queue status: {e}"))?;
                println!("{}", serde_json::to_string_pretty(&counts)?);
            }

            QueueCommands::RequeueFailed { input } => {
                let store = MemoryJobStore::from_jobs(load_jobs(&input)?);
                let requeued = store
                    .requeue_failed(chrono::Utc::now())
                    .map_err(|e| anyhow::anyhow!("cannot requeue failed jobs: {e}"))?;

                let content = serde_json::to_string_pretty(&store.jobs_snapshot())?;
                std::fs::write(&input, content)
                    .with_context(|| format!("cannot write queue file {}", input.display()))?;

                println!("Requeued {requeued} failed job(s)");
            }
        },
    }

    Ok(())
}
