use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, bail, eyre};
use futures_util::StreamExt;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use tv_artwork::application::Paginator;
use tv_artwork::domain::entities::{ImageCandidate, PresentationContext};
use tv_artwork::domain::ports::CatalogPort;
use tv_artwork::infrastructure::{
    AppConfig, ArtworkPipeline, CliArgs, Command, ImageLoadEvent, JsonCatalog, StorageManager,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let storage = StorageManager::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

async fn run(args: CliArgs, config: &AppConfig) -> Result<()> {
    let catalog = Arc::new(JsonCatalog::load(args.command.catalog())?);
    let pipeline = ArtworkPipeline::with_http(config, Some(catalog.clone()))?;

    run_command(args.command, config, &catalog, &pipeline).await
}

/// Runs one command and shuts the pipeline down whatever the outcome.
async fn run_command(
    command: Command,
    config: &AppConfig,
    catalog: &JsonCatalog,
    pipeline: &ArtworkPipeline,
) -> Result<()> {
    let result = execute(command, config, catalog, pipeline).await;
    pipeline.shutdown();
    result
}

async fn execute(
    command: Command,
    config: &AppConfig,
    catalog: &JsonCatalog,
    pipeline: &ArtworkPipeline,
) -> Result<()> {
    match command {
        Command::Resolve {
            item: item_id,
            context,
            ..
        } => {
            let item = catalog
                .item(&item_id)
                .ok_or_else(|| eyre!("item {item_id} not found in catalog"))?;
            let context = context.unwrap_or_else(|| PresentationContext::for_kind(item.kind()));

            println!("{} ({context})", item.id());
            for (i, candidate) in pipeline.resolver().resolve(&item, context).iter().enumerate() {
                match candidate {
                    ImageCandidate::Remote(descriptor) => println!(
                        "{i:>2}. {:<14} {}x{}  {}",
                        descriptor.role(),
                        descriptor.width(),
                        descriptor.height(),
                        descriptor.url()
                    ),
                    ImageCandidate::Placeholder { role } => println!("{i:>2}. placeholder ({role})"),
                }
            }
        }
        Command::Warm {
            focus,
            page,
            context,
            ..
        } => {
            let mut paginator = Paginator::new();
            paginator.initialize(catalog.items().to_vec(), config.paging.page_size);
            if !paginator.go_to_page(page) {
                bail!("page {page} out of range (0..{})", paginator.total_pages());
            }
            let items = paginator.current_items();
            if focus >= items.len() {
                bail!("focus {focus} out of range (0..{})", items.len());
            }

            let scheduler = pipeline.scheduler(context);
            scheduler.on_focus_changed(focus, items);
            scheduler.flush().await;

            println!("{}", scheduler.stats());
            println!("{}", pipeline.cache().stats());
        }
        Command::Load {
            item: item_id,
            context,
            ..
        } => {
            let context = context
                .or_else(|| {
                    catalog
                        .item(&item_id)
                        .map(|item| PresentationContext::for_kind(item.kind()))
                })
                .unwrap_or(PresentationContext::Poster);

            let mut events = pipeline.loader().load_image_by_id(&item_id, context);
            while let Some(event) = events.next().await {
                match event {
                    ImageLoadEvent::Loading => println!("loading {item_id} ({context})"),
                    ImageLoadEvent::Success(loaded) => println!(
                        "loaded {} {}x{} ({} bytes) from {}",
                        loaded.descriptor.role(),
                        loaded.payload().width(),
                        loaded.payload().height(),
                        loaded.payload().byte_size(),
                        loaded.descriptor.url()
                    ),
                    ImageLoadEvent::Error(kind) => println!("error: {kind}"),
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;

    init_logging(&config)?;

    info!(version = tv_artwork::VERSION, "Starting {}", tv_artwork::NAME);

    run(args, &config).await
}
