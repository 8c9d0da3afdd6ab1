//! # pagetree CLI Module
//!
//! This module implements the CLI interface for pagetree.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Initialize a new database with the parked fixtures
//! - `status` - Show tree counters
//! - `find` - Query pages
//! - `insert` - Insert a page
//! - `move` - Move a page before, after or inside another
//! - `trash` - Move a page into the trash
//! - `check` - Verify tree invariants
//! - `repair` - Renumber sibling ranks
//! - `export` - Export a snapshot to a file
//! - `import` - Replace the tree with a snapshot file
//!
//! The CLI acts as an administrator.

mod commands;

use crate::config::{Backend, Config};
use clap::{Parser, Subcommand};
use pagetree_core::{Position, TreeError};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// pagetree - materialized-path page tree engine
///
/// Stores pages as a flat collection organized into a tree by their paths,
/// and keeps paths, levels and sibling order consistent while pages are
/// inserted and moved.
#[derive(Parser, Debug)]
#[command(name = "pagetree")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a pagetree.toml configuration file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the tree database (overrides the config file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend (overrides the config file)
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<Backend>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize a new database with the home page and trash can
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show tree status
    Status,

    /// Query pages
    Find {
        /// Node id
        #[arg(long)]
        id: Option<u64>,

        /// Slug
        #[arg(long)]
        slug: Option<String>,

        /// Exact path
        #[arg(long)]
        path: Option<String>,

        /// Field equality criterion (name=value), repeatable
        #[arg(short = 'f', long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,

        /// Published filter: true, false or any
        #[arg(long, default_value = "true", value_parser = parse_filter)]
        published: pagetree_core::Filter,

        /// Trash filter: true, false or any
        #[arg(long, default_value = "false", value_parser = parse_filter)]
        trash: pagetree_core::Filter,

        /// Attach ancestors: "all" or a depth
        #[arg(long, value_parser = parse_ancestors)]
        ancestors: Option<pagetree_core::Ancestors>,

        /// Attach children to every attached ancestor
        #[arg(long)]
        ancestors_children: bool,

        /// Attach immediate children
        #[arg(long)]
        children: bool,

        /// Skip the first N results
        #[arg(long, default_value = "0")]
        skip: usize,

        /// Return at most N results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Insert a page as the last child of a parent
    Insert {
        /// Parent node id
        #[arg(long)]
        parent: u64,

        /// Slug of the new page
        #[arg(short, long)]
        slug: String,

        /// Title (defaults to the slug)
        #[arg(long)]
        title: Option<String>,

        /// Page type
        #[arg(short = 't', long = "type", default_value = "page")]
        node_type: String,

        /// Create the page unpublished
        #[arg(long)]
        unpublished: bool,

        /// Content field (name=value), repeatable
        #[arg(short = 'f', long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },

    /// Move a page before, after or inside a target page
    Move {
        /// Node to move
        #[arg(short, long)]
        node: u64,

        /// Target node
        #[arg(short, long)]
        target: u64,

        /// Placement relative to the target: before, after, inside
        #[arg(short, long, default_value = "inside")]
        position: Position,

        /// Only print the records the move would rewrite
        #[arg(long)]
        dry_run: bool,
    },

    /// Move a page into the trash
    Trash {
        /// Node to trash
        #[arg(short, long)]
        node: u64,
    },

    /// Verify tree invariants
    Check,

    /// Renumber sibling ranks to close gaps
    Repair,

    /// Export the tree as a snapshot file
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Replace the tree with a snapshot file
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },
}

// =============================================================================
// ARGUMENT PARSERS
// =============================================================================

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got '{}'", raw)),
    }
}

fn parse_filter(raw: &str) -> Result<pagetree_core::Filter, String> {
    match raw {
        "true" => Ok(pagetree_core::Filter::Only(true)),
        "false" => Ok(pagetree_core::Filter::Only(false)),
        "any" => Ok(pagetree_core::Filter::Any),
        other => Err(format!("expected true, false or any, got '{}'", other)),
    }
}

fn parse_ancestors(raw: &str) -> Result<pagetree_core::Ancestors, String> {
    if raw == "all" {
        return Ok(pagetree_core::Ancestors::All);
    }
    raw.parse::<usize>()
        .map(pagetree_core::Ancestors::Depth)
        .map_err(|_| format!("expected 'all' or a depth, got '{}'", raw))
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), TreeError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.storage.database = database;
    }
    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
    }
    tracing::debug!(
        database = %config.storage.database.display(),
        backend = %config.storage.backend,
        "resolved storage configuration"
    );
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_server(&config).await
        }
        Some(Commands::Init { force }) => cmd_init(&config, force),
        Some(Commands::Status) => cmd_status(&config, json_mode),
        Some(Commands::Find {
            id,
            slug,
            path,
            fields,
            published,
            trash,
            ancestors,
            ancestors_children,
            children,
            skip,
            limit,
        }) => {
            let query = FindArgs {
                id,
                slug,
                path,
                fields,
                published,
                trash,
                ancestors: ancestors.unwrap_or_default(),
                ancestors_children,
                children,
                skip,
                limit,
            };
            cmd_find(&config, json_mode, &query)
        }
        Some(Commands::Insert {
            parent,
            slug,
            title,
            node_type,
            unpublished,
            fields,
        }) => {
            let mut draft = pagetree_core::NodeDraft::new(slug)
                .node_type(node_type)
                .published(!unpublished);
            if let Some(title) = title {
                draft = draft.title(title);
            }
            draft.fields.extend(fields);
            cmd_insert(&config, json_mode, parent, draft)
        }
        Some(Commands::Move {
            node,
            target,
            position,
            dry_run,
        }) => cmd_move(&config, json_mode, node, target, position, dry_run),
        Some(Commands::Trash { node }) => cmd_trash(&config, json_mode, node),
        Some(Commands::Check) => cmd_check(&config, json_mode),
        Some(Commands::Repair) => cmd_repair(&config),
        Some(Commands::Export { output }) => cmd_export(&config, &output),
        Some(Commands::Import { input }) => cmd_import(&config, &input),
        None => {
            // No subcommand - show status by default
            cmd_status(&config, json_mode)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pagetree_core::{Ancestors, Filter};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_move_with_position() {
        let cli = Cli::try_parse_from([
            "pagetree", "-B", "file", "move", "-n", "4312", "-t", "1234", "-p", "after",
        ])
        .expect("parse");
        assert_eq!(cli.backend, Some(Backend::File));
        assert!(matches!(
            cli.command,
            Some(Commands::Move {
                node: 4312,
                target: 1234,
                position: Position::After,
                dry_run: false,
            })
        ));
    }

    #[test]
    fn rejects_unknown_position() {
        let result = Cli::try_parse_from(["pagetree", "move", "-n", "1", "-t", "2", "-p", "under"]);
        assert!(result.is_err());
    }

    #[test]
    fn find_filters_and_fields() {
        let cli = Cli::try_parse_from([
            "pagetree",
            "find",
            "--published",
            "any",
            "--ancestors",
            "2",
            "-f",
            "type=article",
        ])
        .expect("parse");
        let Some(Commands::Find {
            published,
            trash,
            ancestors,
            fields,
            ..
        }) = cli.command
        else {
            unreachable!("expected find");
        };
        assert_eq!(published, Filter::Any);
        assert_eq!(trash, Filter::Only(false));
        assert_eq!(ancestors, Some(Ancestors::Depth(2)));
        assert_eq!(fields, vec![("type".to_string(), "article".to_string())]);
    }

    #[test]
    fn field_parser_requires_name() {
        assert!(parse_field("=x").is_err());
        assert!(parse_field("novalue").is_err());
        assert_eq!(
            parse_field("color=").expect("parse"),
            ("color".to_string(), String::new())
        );
    }
}
