use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uni_scout::commands::{
    embed_missing, init_data_dir, process_raw, reset_catalog, run_chat, scrape_urls,
    search_catalog, serve_api, show_status,
};
use uni_scout::config::{Config, resolve_data_dir, run_interactive_config, show_config};
use uni_scout::search::SearchType;
use uni_scout::{Result, ScoutError};

#[derive(Parser)]
#[command(name = "uni-scout")]
#[command(about = "Build a searchable catalog of universities and courses, then chat with it")]
#[command(version)]
struct Cli {
    /// Data directory (defaults to ~/.uni-scout)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the language model provider and server
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Create the data directory, catalog database and vector table
    Init,
    /// Delete all catalog rows and embeddings
    Reset {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Download pages into the raw directory
    Scrape {
        /// Pages to fetch
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Extract universities and courses from raw files
    Process {
        /// Read raw files from this directory instead of the configured one
        #[arg(long)]
        raw_dir: Option<PathBuf>,
    },
    /// Embed rows that have no vector yet
    Embed {
        /// Reconcile SQLite and LanceDB before embedding
        #[arg(long)]
        fix: bool,
    },
    /// Chat with the catalog in the terminal
    Chat,
    /// Start the REST API
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to bind
        #[arg(long)]
        port: Option<u16>,
    },
    /// Semantic search from the command line
    Search {
        query: String,
        /// Maximum results per entity type
        #[arg(long, short)]
        limit: Option<usize>,
        /// all, universities or courses
        #[arg(long = "type", short = 't', default_value = "all")]
        search_type: SearchType,
    },
    /// Show catalog counts, provider health and store consistency
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let data_dir =
        resolve_data_dir(cli.data_dir.as_deref()).map_err(|e| ScoutError::Config(e.to_string()))?;

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&data_dir)?;
        } else {
            run_interactive_config(&data_dir)?;
        }
        return Ok(());
    }

    let mut config = Config::load(&data_dir)?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Init => init_data_dir(&config).await?,
        Commands::Reset { yes } => reset_catalog(&config, yes).await?,
        Commands::Scrape { urls } => scrape_urls(&config, &urls).await?,
        Commands::Process { raw_dir } => process_raw(&config, raw_dir).await?,
        Commands::Embed { fix } => embed_missing(&config, fix).await?,
        Commands::Chat => run_chat(&config).await?,
        Commands::Serve { host, port } => serve_api(&mut config, host, port).await?,
        Commands::Search {
            query,
            limit,
            search_type,
        } => search_catalog(&config, &query, limit, search_type).await?,
        Commands::Status => show_status(&config).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["uni-scout", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Status));
            assert_eq!(parsed.data_dir, None);
        }
    }

    #[test]
    fn global_data_dir() {
        let cli = Cli::try_parse_from(["uni-scout", "init", "--data-dir", "/tmp/scout"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Init));
            assert_eq!(parsed.data_dir, Some(PathBuf::from("/tmp/scout")));
        }
    }

    #[test]
    fn scrape_requires_urls() {
        let cli = Cli::try_parse_from(["uni-scout", "scrape"]);
        assert!(cli.is_err());

        let cli = Cli::try_parse_from([
            "uni-scout",
            "scrape",
            "https://ut.ee/en",
            "https://aalto.fi/en",
        ]);
        if let Ok(Cli {
            command: Commands::Scrape { urls },
            ..
        }) = cli
        {
            assert_eq!(urls, vec!["https://ut.ee/en", "https://aalto.fi/en"]);
        } else {
            panic!("scrape with urls should parse");
        }
    }

    #[test]
    fn search_options() {
        let cli = Cli::try_parse_from([
            "uni-scout",
            "search",
            "machine learning in Finland",
            "--limit",
            "3",
            "--type",
            "courses",
        ]);

        if let Ok(Cli {
            command:
                Commands::Search {
                    query,
                    limit,
                    search_type,
                },
            ..
        }) = cli
        {
            assert_eq!(query, "machine learning in Finland");
            assert_eq!(limit, Some(3));
            assert_eq!(search_type, SearchType::Courses);
        } else {
            panic!("search should parse");
        }
    }

    #[test]
    fn search_rejects_unknown_type() {
        let cli = Cli::try_parse_from(["uni-scout", "search", "x", "--type", "programmes"]);
        assert!(cli.is_err());
    }

    #[test]
    fn serve_overrides() {
        let cli = Cli::try_parse_from(["uni-scout", "serve", "--port", "9000"]);

        if let Ok(Cli {
            command: Commands::Serve { host, port },
            ..
        }) = cli
        {
            assert_eq!(host, None);
            assert_eq!(port, Some(9000));
        } else {
            panic!("serve should parse");
        }
    }

    #[test]
    fn flags_default_off() {
        let cli = Cli::try_parse_from(["uni-scout", "embed"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Embed { fix: false })
        ));

        let cli = Cli::try_parse_from(["uni-scout", "reset", "-y"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Reset { yes: true })
        ));
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["uni-scout", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["uni-scout", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["uni-scout", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
