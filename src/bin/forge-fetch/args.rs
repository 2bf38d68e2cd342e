use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use forge_fetch::{Config, Input, Rev, SchemeRegistry};

use crate::error::AppError;

// Shamelessly borrowed from https://github.com/crate-ci/clap-cargo/blob/0378657ffdf2b67bcd6f1ab56e04a1322b92dd0e/src/style.rs
// thanks to https://stackoverflow.com/a/79614957
use anstyle::AnsiColor::*;
use anstyle::Effects;
use anstyle::Style;

const HEADER: Style = Green.on_default().effects(Effects::BOLD);
const USAGE: Style = Green.on_default().effects(Effects::BOLD);
const LITERAL: Style = Cyan.on_default().effects(Effects::BOLD);
const PLACEHOLDER: Style = Cyan.on_default();
const ERROR: Style = Red.on_default().effects(Effects::BOLD);
const VALID: Style = Cyan.on_default().effects(Effects::BOLD);
const INVALID: Style = Yellow.on_default().effects(Effects::BOLD);

const APP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(HEADER)
    .usage(USAGE)
    .literal(LITERAL)
    .placeholder(PLACEHOLDER)
    .error(ERROR)
    .valid(VALID)
    .invalid(INVALID);

#[derive(Debug, Parser)]
#[command(name = "forge-fetch")]
#[command(about = "Fetch source trees from GitHub and GitLab by commit, branch or tag")]
#[command(version, long_about = None)]
#[command(styles = APP_STYLING)]
#[command(term_width = 80)]
pub struct Args {
    /// Configuration file. If omitted, check the `FORGE_FETCH_CONFIG` environment variable and
    /// then the platform configuration directory.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Cache directory to use, overriding the configuration file.
    #[arg(long = "cache", short = 'c', value_name = "PATH", global = true)]
    cache_dir: Option<PathBuf>,

    /// Log debug messages. `RUST_LOG` takes precedence.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// A branch/tag or commit to apply to every locator on the command line.
#[derive(Debug, clap::Args)]
struct Overrides {
    /// Branch or tag name to fetch instead of the locator's own.
    #[arg(long = "ref", value_name = "REF", conflicts_with = "rev")]
    git_ref: Option<String>,

    /// Commit hash to fetch instead of the locator's own.
    #[arg(long, value_name = "HASH")]
    rev: Option<Rev>,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Fetch source trees into the store and cache them
    Fetch {
        /// Locators such as `github:owner/repo/branch`
        #[arg(value_name = "LOCATOR", required = true)]
        locators: Vec<String>,

        #[command(flatten)]
        overrides: Overrides,

        /// Output format
        #[arg(long, short = 'f', value_enum, value_name = "FORMAT")]
        format: Option<OutputFormat>,

        /// Number of threads to spawn. Defaults to one per logical CPU.
        #[arg(long, short = 't', value_name = "NUM-THREADS")]
        threads: Option<u32>,
    },
    /// Print the commit a locator currently resolves to
    Resolve {
        #[arg(value_name = "LOCATOR")]
        locator: String,

        #[command(flatten)]
        overrides: Overrides,
    },
    /// Print the archive download URL and the clone URL of a locator
    Urls {
        #[arg(value_name = "LOCATOR")]
        locator: String,

        #[command(flatten)]
        overrides: Overrides,
    },
    /// Clone a locator's repository with git
    Clone {
        #[arg(value_name = "LOCATOR")]
        locator: String,

        /// Directory to clone into. Must not exist or be empty.
        #[arg(value_name = "DEST")]
        dest: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },
    /// List the cached source trees
    Cached {
        /// Output format
        #[arg(long, short = 'f', value_enum, value_name = "FORMAT")]
        format: Option<OutputFormat>,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Output in JSON format
    Json,
    /// Output in TOML format
    Toml,
}

#[derive(Debug)]
pub struct ValidatedArgs {
    pub config: Config,
    pub registry: Arc<SchemeRegistry>,
    pub command: ValidatedCommand,
}

#[derive(Debug)]
pub enum ValidatedCommand {
    Fetch {
        inputs: Vec<Input>,
        format: Option<OutputFormat>,
    },
    Resolve {
        input: Input,
    },
    Urls {
        input: Input,
    },
    Clone {
        input: Input,
        dest: PathBuf,
    },
    Cached {
        format: Option<OutputFormat>,
    },
}

impl ValidatedArgs {
    fn load_config(path: Option<PathBuf>, cache_dir: Option<PathBuf>) -> Result<Config, AppError> {
        let mut config = Config::load(path.as_deref())
            .map_err(|e| AppError::arg_validation(format!("failed to load configuration: {e}")))?;
        if cache_dir.is_some() {
            config.cache_dir = cache_dir;
        }
        Ok(config)
    }

    fn parse_input(registry: &SchemeRegistry, locator: &str, overrides: &Overrides) -> Result<Input, AppError> {
        let input = registry
            .parse_locator(locator)
            .and_then(|input| input.apply_overrides(overrides.git_ref.as_deref(), overrides.rev));
        input.map_err(|e| AppError::arg_validation(e.to_string()))
    }
}

impl TryFrom<Args> for ValidatedArgs {
    type Error = AppError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let config = ValidatedArgs::load_config(args.config, args.cache_dir)?;
        let registry = SchemeRegistry::with_defaults(config.access_tokens()).install();
        let command = match args.command {
            Command::Fetch {
                locators,
                overrides,
                format,
                threads,
            } => {
                let inputs = locators
                    .iter()
                    .map(|locator| ValidatedArgs::parse_input(&registry, locator, &overrides))
                    .collect::<Result<Vec<_>, _>>()?;

                if let Some(threads) = threads {
                    rayon::ThreadPoolBuilder::new()
                        .num_threads(threads as usize)
                        .build_global()
                        .map_err(|e| {
                            AppError::arg_validation(format!("Failed to set thread count: {e}"))
                        })?;
                }

                ValidatedCommand::Fetch { inputs, format }
            }
            Command::Resolve { locator, overrides } => ValidatedCommand::Resolve {
                input: ValidatedArgs::parse_input(&registry, &locator, &overrides)?,
            },
            Command::Urls { locator, overrides } => ValidatedCommand::Urls {
                input: ValidatedArgs::parse_input(&registry, &locator, &overrides)?,
            },
            Command::Clone {
                locator,
                dest,
                overrides,
            } => {
                if dest.exists() && std::fs::read_dir(&dest)?.next().is_some() {
                    return Err(AppError::arg_validation(format!(
                        "destination is not empty: {}",
                        dest.display()
                    )));
                }
                ValidatedCommand::Clone {
                    input: ValidatedArgs::parse_input(&registry, &locator, &overrides)?,
                    dest,
                }
            }
            Command::Cached { format } => ValidatedCommand::Cached { format },
        };
        Ok(ValidatedArgs {
            config,
            registry,
            command,
        })
    }
}
