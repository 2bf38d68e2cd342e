use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use forge_fetch::{Attrs, Cache, CacheEntry, Config, Fetcher, HttpTransport, Input, LocalStore, SchemeRegistry, Tree};

use crate::args::{OutputFormat, ValidatedArgs, ValidatedCommand};
use crate::error::AppError;

mod args;
mod error;
mod progress;

/// What `fetch` reports for each locator.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchedRecord {
    locked: String,
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_modified: Option<u64>,
    nar_hash: String,
    attrs: Attrs,
}

impl FetchedRecord {
    fn new(tree: Tree, locked: Input) -> Self {
        Self {
            locked: locked.to_locator(),
            path: tree.path,
            last_modified: locked.last_modified(),
            nar_hash: tree.nar_hash,
            attrs: locked.to_attrs(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct CachedListing<'a> {
    entries: &'a [CacheEntry],
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "warn,forge_fetch=debug"
    } else {
        "warn,forge_fetch=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Render an error followed by its chain of sources.
fn report(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}

fn make_fetcher(config: &Config, registry: Arc<SchemeRegistry>) -> Result<Fetcher, AppError> {
    let transport = HttpTransport::new(config.user_agent())
        .map_err(|e| AppError::setup("the HTTP client", e))?;
    let store = config
        .store_dir()
        .and_then(LocalStore::open)
        .map_err(|e| AppError::setup("the store", e))?;
    let cache = config
        .cache_dir()
        .and_then(Cache::load)
        .map_err(|e| AppError::setup("the cache", e))?;
    Ok(Fetcher::new(
        registry,
        Arc::new(transport),
        Arc::new(store),
        Arc::new(cache),
    ))
}

fn save_cache(cache: &Cache) -> Result<(), AppError> {
    cache.save().map_err(|e| {
        let path = cache.cache_file().map(PathBuf::from).unwrap_or_default();
        AppError::cache_save_failed(path, e)
    })
}

fn format_output<T: serde::Serialize>(value: &T, format: OutputFormat) -> Result<String, AppError> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).map_err(AppError::output),
        OutputFormat::Toml => toml::to_string(value).map_err(AppError::output),
    }
}

fn print_fetched(fetched: &BTreeMap<String, FetchedRecord>, format: Option<OutputFormat>) -> Result<(), AppError> {
    if let Some(format) = format {
        println!("{}", format_output(fetched, format)?);
        return Ok(());
    }
    for record in fetched.values() {
        println!("{}", record.locked);
        println!("  path: {}", record.path.display());
        if let Some(last_modified) = record.last_modified {
            println!("  lastModified: {last_modified}");
        }
        println!("  narHash: {}", record.nar_hash);
    }
    Ok(())
}

fn print_cached(cache: &Cache, format: Option<OutputFormat>) -> Result<(), AppError> {
    let entries = cache.entries();
    if let Some(format) = format {
        println!("{}", format_output(&CachedListing { entries: &entries }, format)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No cached sources");
    }
    for entry in &entries {
        println!(
            "{} {} -> {}",
            entry.key.kind(),
            entry.key.rev(),
            entry.store_path.display()
        );
    }
    Ok(())
}

fn run(args: ValidatedArgs) -> Result<(), AppError> {
    let ValidatedArgs {
        config,
        registry,
        command,
    } = args;
    match command {
        ValidatedCommand::Cached { format } => {
            let cache = config
                .cache_dir()
                .and_then(Cache::load)
                .map_err(|e| AppError::setup("the cache", e))?;
            print_cached(&cache, format)
        }
        ValidatedCommand::Fetch { inputs, format } => {
            let fetcher = make_fetcher(&config, registry)?;
            let results = progress::parallel_fetch(&fetcher, &inputs);
            let mut fetched = BTreeMap::new();
            let mut failed = 0usize;
            for (input, result) in inputs.iter().zip(results) {
                match result {
                    Ok((tree, locked)) => {
                        fetched.insert(input.to_string(), FetchedRecord::new(tree, locked));
                    }
                    Err(fetch_error) => {
                        eprintln!("❌ Failed to fetch '{input}': {}", report(&fetch_error));
                        failed += 1;
                    }
                }
            }
            save_cache(fetcher.cache())?;
            print_fetched(&fetched, format)?;
            if failed > 0 {
                return Err(AppError::fetch());
            }
            Ok(())
        }
        ValidatedCommand::Resolve { input } => {
            let fetcher = make_fetcher(&config, registry)?;
            let rev = fetcher
                .resolve(&input)
                .map_err(|e| AppError::remote("resolve", &input, e))?;
            println!("{rev}");
            Ok(())
        }
        ValidatedCommand::Urls { input } => {
            let fetcher = make_fetcher(&config, registry)?;
            let request = fetcher
                .download_request(&input)
                .map_err(|e| AppError::remote("resolve", &input, e))?;
            let clone_url = fetcher
                .clone_url(&input)
                .map_err(|e| AppError::remote("resolve", &input, e))?;
            println!("download: {}", request.url);
            println!("clone: {clone_url}");
            Ok(())
        }
        ValidatedCommand::Clone { input, dest } => {
            let fetcher = make_fetcher(&config, registry)?;
            let dest = fetcher
                .clone(&input, &dest)
                .map_err(|e| AppError::remote("clone", &input, e))?;
            println!("✅ 🔗 Cloned {input} into {}", dest.display());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let args = args::Args::parse();
    init_logging(args.verbose);
    match ValidatedArgs::try_from(args).and_then(run) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("❌ {}", report(&err));
            err.into()
        }
    }
}
