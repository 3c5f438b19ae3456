//! verz CLI - a minimal git client that clones over smart HTTP.

use clap::{ArgGroup, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

mod commands;
mod logging;
mod settings;

use commands::{CatMode, LsTreeOptions};
use settings::{Config, CONFIG_ENV};

/// verz - clone git repositories and inspect their objects
#[derive(Parser, Debug)]
#[command(name = "verz")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (TOML)
    #[arg(long, env = CONFIG_ENV, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clone a repository over smart HTTP
    Clone {
        /// Remote URL, e.g. https://host/owner/repo.git
        url: String,
        /// Destination directory (default: derived from the URL)
        dir: Option<PathBuf>,
    },

    /// Create an empty repository
    Init {
        /// Directory to initialize (default: current directory)
        dir: Option<PathBuf>,
    },

    /// Show an object's content, type or size
    #[command(group(ArgGroup::new("mode").required(true).args(["pretty", "show_type", "size"])))]
    CatFile {
        /// Print the object content
        #[arg(short = 'p')]
        pretty: bool,
        /// Print the object type
        #[arg(short = 't')]
        show_type: bool,
        /// Print the object size
        #[arg(short = 's')]
        size: bool,
        /// Object id
        object: String,
    },

    /// Compute a file's blob id
    HashObject {
        /// Also write the blob to the object store
        #[arg(short = 'w')]
        write: bool,
        /// File to hash
        file: PathBuf,
    },

    /// List a tree's entries
    LsTree {
        /// Recurse into subtrees
        #[arg(short = 'r')]
        recursive: bool,
        /// Print only paths
        #[arg(long)]
        name_only: bool,
        /// Tree or commit id
        object: String,
    },

    /// Store the working directory as tree objects and print the root tree id
    WriteTree,

    /// Show the commit history of HEAD
    Log {
        /// Show at most this many commits
        #[arg(short = 'n', long = "max-count")]
        max_count: Option<usize>,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };

    let level = logging::level_for_verbosity(cli.verbose).unwrap_or(config.log_level.as_str());
    logging::init_logging(level, logging::LogFormat::parse(&config.log_format));

    if let Err(e) = run(cli.command, &config) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Commands, config: &Config) -> commands::Result<()> {
    let cwd = std::env::current_dir()?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Clone { url, dir } => commands::clone(&url, dir.as_deref(), config),
        Commands::Init { dir } => commands::init(dir.as_deref()),
        Commands::CatFile {
            pretty: _,
            show_type,
            size,
            object,
        } => {
            let mode = if show_type {
                CatMode::Type
            } else if size {
                CatMode::Size
            } else {
                CatMode::Pretty
            };
            commands::cat_file(&cwd, mode, &object, &mut out)
        }
        Commands::HashObject { write, file } => {
            commands::hash_object(&cwd, &file, write, &mut out)
        }
        Commands::LsTree {
            recursive,
            name_only,
            object,
        } => commands::ls_tree(
            &cwd,
            &object,
            LsTreeOptions {
                recursive,
                name_only,
            },
            &mut out,
        ),
        Commands::WriteTree => commands::write_tree(&cwd, &mut out),
        Commands::Log { max_count } => commands::log(&cwd, max_count, &mut out),
    }?;

    out.flush()?;
    Ok(())
}
