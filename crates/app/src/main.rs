use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_qa_core::{
    ingest_best_effort, load_dotenv, new_session_id, setup_index, CharacterNgramEmbedder,
    Embedder, ExtractionChain, ExtractionMethod, InMemorySessionStore, IndexLocation,
    IngestionReport, KnowledgeBase, OpenAiChatModel, OpenAiEmbedder, PipelineError, RagPipeline,
    RebuildPolicy, Settings,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-qa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory scanned for PDFs when no explicit paths are given.
    #[arg(long, env = "DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Comma-separated PDF files; takes precedence over the data directory.
    #[arg(long, value_delimiter = ',', global = true)]
    pdf_paths: Vec<PathBuf>,

    /// Embed with the local character n-gram model instead of the embeddings API.
    #[arg(long, default_value_t = false, global = true)]
    offline_embeddings: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Extract and chunk the PDFs and rebuild the persisted index.
    Ingest,
    /// Answer a single question.
    Ask {
        /// Question to answer.
        query: String,
        /// Conversation to extend.
        #[arg(long, default_value = "default")]
        session: String,
        /// Answer from the persisted index without re-reading the PDFs.
        #[arg(long, default_value_t = false)]
        no_ingest: bool,
    },
    /// Interactive conversation; `quit`, `exit` or `q` ends it, `/reset` forgets the history.
    Chat {
        /// Conversation to extend.
        #[arg(long, default_value = "default-session")]
        session: String,
        /// Start under a fresh random session id.
        #[arg(long, default_value_t = false)]
        new_session: bool,
        /// Answer from the persisted index without re-reading the PDFs.
        #[arg(long, default_value_t = false)]
        no_ingest: bool,
    },
}

fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(data_dir) = &cli.data_dir {
        settings.data_dir = data_dir.clone();
    }
    if !cli.pdf_paths.is_empty() {
        settings.pdf_file_paths = Some(cli.pdf_paths.clone());
    }
}

fn embedder(settings: &Settings, offline: bool) -> anyhow::Result<Arc<dyn Embedder>> {
    if offline {
        return Ok(Arc::new(CharacterNgramEmbedder::default()));
    }
    let embedder = OpenAiEmbedder::new(&settings.openai).context("building embeddings client")?;
    Ok(Arc::new(embedder))
}

async fn ingest(settings: &Settings) -> anyhow::Result<IngestionReport> {
    let source = settings.pdf_source();
    let options = settings.ingestion.clone();
    let report = tokio::task::spawn_blocking(move || {
        ingest_best_effort(&source, &ExtractionChain::default(), &options)
    })
    .await
    .context("ingestion task panicked")??;

    for skipped in &report.skipped_files {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
    }
    info!(
        files = report.processed_files,
        passages = report.passages.len(),
        primary = report.pages_extracted_with(ExtractionMethod::Primary),
        secondary = report.pages_extracted_with(ExtractionMethod::Secondary),
        ocr = report.pages_extracted_with(ExtractionMethod::Ocr),
        fallback = report.pages_extracted_with(ExtractionMethod::GarbledFallback),
        "pdfs ingested"
    );
    Ok(report)
}

async fn knowledge_base(
    settings: &Settings,
    offline: bool,
    read_pdfs: bool,
) -> anyhow::Result<KnowledgeBase> {
    let passages = if read_pdfs {
        ingest(settings).await?.passages
    } else {
        Vec::new()
    };

    let location = IndexLocation {
        directory: settings.persist_directory.clone(),
        collection: settings.collection_name.clone(),
    };
    let retriever = setup_index(
        passages,
        &location,
        embedder(settings, offline)?,
        RebuildPolicy::default(),
        settings.retrieval_k,
    )
    .await
    .context("setting up the index")?;
    Ok(retriever)
}

fn pipeline(settings: &Settings, retriever: KnowledgeBase) -> anyhow::Result<RagPipeline> {
    let model = OpenAiChatModel::new(&settings.openai).context("building chat client")?;
    Ok(RagPipeline::new(
        Arc::new(model),
        Arc::new(retriever),
        Arc::new(InMemorySessionStore::new(settings.session_ttl)),
    ))
}

/// Renders one turn for the terminal. A failed turn is reported, not fatal.
fn turn_output(session: &str, result: Result<String, PipelineError>) -> String {
    match result {
        Ok(answer) => format!("Answer: {answer}"),
        Err(failure) => {
            error!(session, stage = ?failure.stage(), error = %failure, "turn failed");
            format!("Error: {failure}")
        }
    }
}

async fn chat(pipeline: &RagPipeline, session: &str) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stdout
        .write_all(b"Type 'quit' or 'exit' to end the conversation\n")
        .await?;
    loop {
        stdout.write_all(b"\nYou: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "quit" | "exit" | "q") {
            stdout.write_all(b"\nGoodbye!\n").await?;
            break;
        }
        if input == "/reset" {
            pipeline.reset(session).await;
            stdout.write_all(b"\nConversation history cleared.\n").await?;
            continue;
        }

        let line = match pipeline.ask(input, session).await {
            Ok(answer) => format!("Assistant: {answer}"),
            failed => turn_output(session, failed),
        };
        stdout.write_all(format!("\n{line}\n").as_bytes()).await?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    let dotenv_files = load_dotenv(Path::new("."))?;

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    for path in &dotenv_files {
        info!(path = %path.display(), "loaded environment file");
    }

    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;
    apply_overrides(&mut settings, &cli);

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        model = %settings.openai.chat_model,
        "pdf-qa boot"
    );

    match cli.command {
        Command::Ingest => {
            let report = ingest(&settings).await?;
            let passages = report.passages.len();
            setup_index(
                report.passages,
                &IndexLocation {
                    directory: settings.persist_directory.clone(),
                    collection: settings.collection_name.clone(),
                },
                embedder(&settings, cli.offline_embeddings)?,
                RebuildPolicy::default(),
                settings.retrieval_k,
            )
            .await
            .context("building the index")?;

            println!(
                "{passages} passages from {} file(s) indexed at {} ({} skipped)",
                report.processed_files,
                Utc::now().to_rfc3339(),
                report.skipped_files.len()
            );
        }
        Command::Ask {
            query,
            session,
            no_ingest,
        } => {
            let retriever = knowledge_base(&settings, cli.offline_embeddings, !no_ingest).await?;
            let pipeline = pipeline(&settings, retriever)?;

            println!("Query: {query}\n");
            let result = pipeline.ask(&query, &session).await;
            println!("{}", turn_output(&session, result));
        }
        Command::Chat {
            session,
            new_session,
            no_ingest,
        } => {
            let retriever = knowledge_base(&settings, cli.offline_embeddings, !no_ingest).await?;
            let pipeline = pipeline(&settings, retriever)?;
            let session = if new_session {
                new_session_id()
            } else {
                session
            };

            info!(session = %session, "chat started");
            chat(&pipeline, &session).await?;
        }
    }

    Ok(())
}
