use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docpipe::{
    config,
    document::Document,
    gate::FileType,
    logging,
    processing::{PipelineOutcome, PipelineService},
    queue::LocalQueue,
    storage::{BlobStore, LocalBlobStore},
};
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "docpipe-cli",
    about = "Run documents through the analysis and indexing pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process local files; directories are walked recursively.
    Run {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Documents processed at the same time.
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },
    /// Process every message waiting on the local processing queue.
    Drain {
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("Failed to load configuration")?;
    logging::init_tracing();

    let pipeline = Arc::new(
        PipelineService::from_config(&config).context("Failed to initialize pipeline")?,
    );
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; cancelling in-flight documents");
            on_signal.cancel();
        }
    });

    let outcomes: Vec<PipelineOutcome> = match cli.command {
        Command::Run { paths, concurrency } => {
            let documents = load_paths(&paths).await?;
            let jobs: Vec<((), Document)> =
                documents.into_iter().map(|document| ((), document)).collect();
            process_all(pipeline.clone(), jobs, concurrency, &cancel)
                .await?
                .into_iter()
                .map(|((), outcome)| outcome)
                .collect()
        }
        Command::Drain { concurrency } => {
            drain_queue(pipeline.clone(), &config.storage_root, concurrency, &cancel).await?
        }
    };
    if outcomes.is_empty() {
        println!("nothing to process");
        return Ok(());
    }

    let failed = outcomes
        .iter()
        .filter(|outcome| {
            matches!(
                outcome,
                PipelineOutcome::AnalysisFailed { .. } | PipelineOutcome::IndexFailed { .. }
            )
        })
        .count();

    let snapshot = pipeline.metrics_snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    if failed > 0 {
        bail!("{failed} of {} documents failed", outcomes.len());
    }
    Ok(())
}

/// Runs every job; each outcome comes back paired with the tag it was submitted with.
async fn process_all<T: Send + 'static>(
    pipeline: Arc<PipelineService>,
    jobs: Vec<(T, Document)>,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<Vec<(T, PipelineOutcome)>> {
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for (tag, document) in jobs {
        let pipeline = pipeline.clone();
        let permits = permits.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await?;
            let name = document.name().to_string();
            let outcome = pipeline.process(document, &cancel).await;
            println!("{name}\t{}", serde_json::to_string(&outcome)?);
            anyhow::Ok((tag, outcome))
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        outcomes.push(joined.context("Pipeline task panicked")??);
    }
    Ok(outcomes)
}

async fn load_paths(paths: &[PathBuf]) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for root in paths {
        if root.is_dir() {
            for entry in WalkDir::new(root).sort_by_file_name() {
                let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
                if entry.file_type().is_file() {
                    let name = relative_name(root, entry.path());
                    documents.push(read_document(entry.path(), name).await?);
                }
            }
        } else {
            let name = root
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .with_context(|| format!("{} is not a file", root.display()))?;
            documents.push(read_document(root, name).await?);
        }
    }
    Ok(documents)
}

/// Process queued messages and acknowledge only those whose outcome is settled. Everything
/// else stays queued for the next drain.
async fn drain_queue(
    pipeline: Arc<PipelineService>,
    storage_root: &Path,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<Vec<PipelineOutcome>> {
    let queue = LocalQueue::under(storage_root);
    let blobs = LocalBlobStore::under(storage_root);
    let messages = queue.pending().await.context("Failed to read processing queue")?;

    let mut jobs = Vec::with_capacity(messages.len());
    for message in messages {
        let name = message.metadata.file_name.clone();
        match blobs.read(&name).await {
            Ok(bytes) => {
                let content_type = message.metadata.content_type.clone();
                jobs.push((message, Document::new(name, content_type, bytes)));
            }
            Err(err) => tracing::warn!(
                blob = %message.blob_url,
                error = %err,
                "Queued blob unavailable; leaving message queued"
            ),
        }
    }

    let results = process_all(pipeline, jobs, concurrency, cancel).await?;
    let settled: Vec<_> = results
        .iter()
        .filter(|(_, outcome)| outcome.is_settled())
        .map(|(message, _)| message.clone())
        .collect();
    let removed = queue
        .acknowledge(&settled)
        .await
        .context("Failed to acknowledge processed messages")?;
    tracing::info!(
        processed = results.len(),
        acknowledged = removed,
        "Drained processing queue"
    );
    Ok(results.into_iter().map(|(_, outcome)| outcome).collect())
}

async fn read_document(path: &Path, name: String) -> Result<Document> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let content_type = FileType::from_file_name(&name).map(|ty| ty.mime_type().to_string());
    Ok(Document::new(name, content_type, bytes))
}

fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
