use anyhow::{Context, Result};
use dialoguer::Confirm;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{self, AppState};
use crate::chat::{ChatAssistant, run_repl};
use crate::config::Config;
use crate::crawler::{CrawlerConfig, PageFetcher};
use crate::database::Database;
use crate::database::lancedb::VectorStore;
use crate::indexer::{EmbeddingIndexer, detach_if_recreated};
use crate::ingest::Ingestor;
use crate::llm::{SharedModel, build_model, run_blocking};
use crate::search::{SearchResponse, SearchType, SemanticSearch};

/// Storage handles shared by most commands
struct Stores {
    database: Arc<Database>,
    vector_store: Arc<VectorStore>,
}

impl Stores {
    async fn open(config: &Config) -> Result<Self> {
        config.ensure_directories()?;
        let database = Database::initialize(config)
            .await
            .context("Failed to initialize SQLite database")?;
        let vector_store = VectorStore::new(config)
            .await
            .context("Failed to initialize LanceDB vector store")?;
        detach_if_recreated(&database, &vector_store).await?;
        Ok(Self {
            database: Arc::new(database),
            vector_store: Arc::new(vector_store),
        })
    }
}

fn model_for(config: &Config) -> Result<SharedModel> {
    build_model(&config.llm).with_context(|| {
        format!(
            "Failed to set up the {} provider. Run 'uni-scout config' to configure it",
            config.llm.provider
        )
    })
}

/// Create the data directory layout, the catalog database and the vector table
#[inline]
pub async fn init_data_dir(config: &Config) -> Result<()> {
    Stores::open(config).await?;

    if config.config_file_path().exists() {
        println!("Using existing configuration: {}", config.config_file_path().display());
    } else {
        config.save().context("Failed to write default configuration")?;
        println!("Wrote default configuration: {}", config.config_file_path().display());
    }

    println!("✅ Initialized data directory: {}", config.get_base_dir().display());
    println!("   Raw files:       {}", config.raw_dir().display());
    println!("   Processed files: {}", config.processed_dir().display());
    println!("   Catalog:         {}", config.database_path().display());
    println!("   Vectors:         {}", config.vector_database_path().display());
    Ok(())
}

/// Delete every catalog row and every embedding
#[inline]
pub async fn reset_catalog(config: &Config, assume_yes: bool) -> Result<()> {
    if !assume_yes
        && !Confirm::new()
            .with_prompt("Delete all universities, courses and embeddings?")
            .default(false)
            .interact()?
    {
        println!("Reset cancelled.");
        return Ok(());
    }

    let stores = Stores::open(config).await?;
    stores.database.reset().await?;
    stores
        .vector_store
        .reset()
        .await
        .context("Failed to reset vector store")?;

    println!("🗑️  Catalog and embeddings deleted.");
    Ok(())
}

/// Fetch pages into the raw directory
#[inline]
pub async fn scrape_urls(config: &Config, urls: &[String]) -> Result<()> {
    let raw_dir = config.raw_dir();
    let mut fetcher = PageFetcher::new(CrawlerConfig::from(&config.crawler));
    let stats = fetcher.scrape_to_dir(urls, &raw_dir).await?;

    println!(
        "🌐 Fetched {} of {} pages into {}",
        stats.fetched,
        urls.len(),
        raw_dir.display()
    );
    for path in &stats.saved_files {
        println!("   {}", path.display());
    }
    if stats.failed > 0 {
        println!("   ⚠️  {} pages failed, see the log for details", stats.failed);
    }
    Ok(())
}

/// Extract structured records from raw files and embed them
#[inline]
pub async fn process_raw(config: &Config, raw_dir: Option<PathBuf>) -> Result<()> {
    let raw_dir = raw_dir.unwrap_or_else(|| config.raw_dir());
    let stores = Stores::open(config).await?;
    let model = model_for(config)?;

    let ingestor = Ingestor::new(stores.database, stores.vector_store, model, config);
    let stats = ingestor.process_directory(&raw_dir).await?;

    println!("📥 Processing complete ({})", raw_dir.display());
    println!("   Files seen:      {}", stats.files_seen);
    println!("   Processed:       {}", stats.files_processed);
    println!("   Unchanged:       {}", stats.files_skipped);
    println!("   Failed:          {}", stats.files_failed);
    println!("   Universities:    {}", stats.universities_upserted);
    println!("   Courses:         {}", stats.courses_upserted);
    println!("   Embeddings:      {}", stats.embeddings_generated);
    Ok(())
}

/// Embed rows without vectors. With `fix`, repair SQLite/LanceDB drift first.
#[inline]
pub async fn embed_missing(config: &Config, fix: bool) -> Result<()> {
    let stores = Stores::open(config).await?;
    let model = model_for(config)?;
    let indexer = EmbeddingIndexer::new(
        stores.database,
        stores.vector_store,
        model,
        config.llm.batch_size as usize,
    );

    let stats = if fix {
        let repair = indexer.repair().await?;
        println!("🔧 Repair complete");
        println!("   Orphaned embeddings deleted: {}", repair.orphans_deleted);
        println!("   Rows with lost vectors:      {}", repair.rows_detached);
        repair.indexing
    } else {
        indexer.generate_missing().await?
    };

    println!(
        "🧮 Embedded {} universities and {} courses",
        stats.universities_embedded, stats.courses_embedded
    );
    if stats.failed_rows > 0 {
        println!(
            "   ⚠️  {} rows in {} batches failed and remain unembedded",
            stats.failed_rows, stats.failed_batches
        );
    }
    Ok(())
}

fn search_service(config: &Config, stores: Stores, model: SharedModel) -> SemanticSearch {
    SemanticSearch::new(stores.database, stores.vector_store, model, config.search)
}

/// Interactive chat on the terminal
#[inline]
pub async fn run_chat(config: &Config) -> Result<()> {
    let stores = Stores::open(config).await?;
    let model = model_for(config)?;
    let search = search_service(config, stores, Arc::clone(&model));

    run_repl(&ChatAssistant::new(search, model)).await
}

/// Start the REST API
#[inline]
pub async fn serve_api(config: &mut Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.set_port(port)?;
    }
    config.server.validate()?;

    let stores = Stores::open(config).await?;
    let model = model_for(config)?;

    let state = AppState::new(stores.database, stores.vector_store, model, config);
    api::serve(state, &config.server).await
}

/// One-off search printed to stdout
#[inline]
pub async fn search_catalog(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    search_type: SearchType,
) -> Result<()> {
    let stores = Stores::open(config).await?;
    let model = model_for(config)?;
    let search = search_service(config, stores, model);

    let response = search.search(query, limit, search_type).await?;
    print_search_response(&response);
    Ok(())
}

fn print_search_response(response: &SearchResponse) {
    if response.is_empty() {
        println!("No matching universities or courses found.");
        return;
    }

    if !response.universities.is_empty() {
        println!("🏛️  Universities:");
        for hit in &response.universities {
            println!(
                "   [{:.3}] {} ({}) #{}",
                hit.similarity_score, hit.name, hit.country, hit.id
            );
        }
    }

    if !response.courses.is_empty() {
        println!("📘 Courses:");
        for hit in &response.courses {
            println!(
                "   [{:.3}] {} at {} #{}",
                hit.similarity_score, hit.name, hit.university_name, hit.id
            );
            println!("           {} | {}", hit.degree_type, hit.field_of_study);
            if let Some(fees) = &hit.fee_structure {
                println!("           Fees: {fees}");
            }
        }
    }
}

/// Database counts, provider health and consistency between the stores
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 uni-scout Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🗄️  Database Status:");
    let stores = match Stores::open(config).await {
        Ok(stores) => {
            println!("   ✅ SQLite: {}", config.database_path().display());
            println!("   ✅ LanceDB: {}", config.vector_database_path().display());
            Some(stores)
        }
        Err(e) => {
            println!("   ❌ Storage unavailable - {:#}", e);
            None
        }
    };

    println!("🤖 Provider Status:");
    match build_model(&config.llm) {
        Ok(model) => {
            let name = model.model_name().to_string();
            match run_blocking(move || model.health_check()).await {
                Ok(()) => println!("   ✅ {}: reachable ({})", config.llm.provider, name),
                Err(e) => println!("   ⚠️  {}: unhealthy - {:#}", config.llm.provider, e),
            }
        }
        Err(e) => println!("   ❌ {}: not configured - {:#}", config.llm.provider, e),
    }

    let Some(stores) = stores else {
        return Ok(());
    };

    let counts = stores.database.counts().await?;
    println!();
    println!("📚 Catalog:");
    println!(
        "   Universities: {} ({} embedded)",
        counts.universities, counts.embedded_universities
    );
    println!(
        "   Courses:      {} ({} embedded)",
        counts.courses, counts.embedded_courses
    );
    println!("   Raw files ingested: {}", counts.ingested_files);

    println!();
    println!("🔍 Consistency:");
    let validator =
        crate::indexer::ConsistencyValidator::new(&stores.database, &stores.vector_store);
    match validator.validate_consistency().await {
        Ok(report) => {
            println!("   {}", report.summary());
            if !report.is_consistent {
                println!("   Run 'uni-scout embed --fix' to repair.");
            } else if report.rows_without_vectors > 0 {
                println!("   Run 'uni-scout embed' to embed the remaining rows.");
            }
        }
        Err(e) => {
            warn!("Consistency check failed: {:#}", e);
            println!("   ⚠️  Could not validate - {:#}", e);
        }
    }

    info!("Status report complete");
    Ok(())
}
