//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! With the `file` backend the tree lives in memory and the database path
//! holds a snapshot that is rewritten after every change. With `redb` every
//! write is already durable.

use crate::api::{self, AppState, PageJson};
use crate::config::{Backend, Config, StorageConfig};
use pagetree_core::{
    Ancestors, Criterion, CursorOptions, Filter, Node, NodeDraft, NodeId, Position,
    RequestContext, Session, TreeError, snapshot_from_bytes, snapshot_to_bytes,
};
use std::path::{Path, PathBuf};

/// Actor name recorded for CLI operations.
pub const CLI_ACTOR: &str = "cli";

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum file size for import (500 MB).
///
/// Snapshot decoding enforces its own, smaller, payload limit.
const MAX_IMPORT_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), TreeError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| TreeError::Store(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(TreeError::Serialization(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and make sure it names a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, TreeError> {
    let canonical = path.canonicalize().map_err(|e| {
        TreeError::Store(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(TreeError::Store(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent directory of an output path.
fn validate_output_path(path: &Path) -> Result<PathBuf, TreeError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        TreeError::Store(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(TreeError::Store(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| TreeError::Store("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn cli_context() -> RequestContext {
    RequestContext::admin(CLI_ACTOR)
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn print_node(node: &Node) {
    println!(
        "  [{}] {} (level {}, rank {}, type {}{}{})",
        node.id,
        node.path,
        node.level,
        node.rank,
        node.node_type,
        if node.published { "" } else { ", unpublished" },
        if node.trash { ", trash" } else { "" },
    );
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &Config) -> Result<(), TreeError> {
    let storage = &config.storage;
    let mut session = load_or_create_session(storage)?;
    let created = session.park(&config.parked)?;
    if !created.is_empty() {
        save_session(&session, &storage.database)?;
    }

    println!("pagetree server starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", config.server.host);
    println!("  Port:     {}", config.server.port);
    println!("  Backend:  {}", storage.backend);
    println!("  Database: {:?}", storage.database);
    println!();
    println!("Endpoints:");
    println!("  GET  /health      - Health check");
    println!("  GET  /status      - Tree status");
    println!("  POST /pages/query - Query pages");
    println!("  POST /pages       - Insert a page");
    println!("  POST /pages/move  - Move a page");
    println!("  POST /pages/trash - Trash a page");
    println!("  GET  /check       - Verify invariants");
    println!("  POST /export      - Export snapshot");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let mut state = AppState::new(session).with_api_key(config.api_key());
    if storage.backend == Backend::File {
        state = state.with_snapshot_file(storage.database.clone());
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    api::run_server(&addr, state, config).await
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database holding the parked fixtures.
pub fn cmd_init(config: &Config, force: bool) -> Result<(), TreeError> {
    let storage = &config.storage;
    let db_path = &storage.database;
    if db_path.exists() {
        if !force {
            return Err(TreeError::Store(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| TreeError::Store(format!("Remove existing database: {}", e)))?;
    }

    let mut session = match storage.backend {
        Backend::Redb => Session::with_redb(db_path)?,
        Backend::File => Session::new(),
    };
    let created = session.park(&config.parked)?;
    save_session(&session, db_path)?;

    println!(
        "Initialized new {} database at {:?} ({} parked pages)",
        storage.backend,
        db_path,
        created.len()
    );
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show tree status.
pub fn cmd_status(config: &Config, json_mode: bool) -> Result<(), TreeError> {
    let storage = &config.storage;
    let session = load_or_create_session(storage)?;
    let metrics = session.metrics()?;

    if json_mode {
        print_json(&serde_json::json!({
            "database": storage.database.to_string_lossy(),
            "backend": storage.backend,
            "metrics": metrics,
        }));
        return Ok(());
    }

    println!("pagetree Status");
    println!("===============");
    println!("Database: {:?}", storage.database);
    println!("Backend:  {}", storage.backend);
    println!();
    println!("Nodes:       {}", metrics.nodes);
    println!("Max Depth:   {}", metrics.max_depth);
    println!("Trashed:     {}", metrics.trashed);
    println!("Parked:      {}", metrics.parked);
    println!("Unpublished: {}", metrics.unpublished);
    if let Some(next) = metrics.next_node_id {
        println!("Next Id:     {}", next);
    }

    Ok(())
}

// =============================================================================
// FIND COMMAND
// =============================================================================

/// Arguments of `find`, gathered from the command line.
#[derive(Debug, Clone)]
pub struct FindArgs {
    pub id: Option<u64>,
    pub slug: Option<String>,
    pub path: Option<String>,
    pub fields: Vec<(String, String)>,
    pub published: Filter,
    pub trash: Filter,
    pub ancestors: Ancestors,
    pub ancestors_children: bool,
    pub children: bool,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl FindArgs {
    /// Cursor options for these arguments.
    #[must_use]
    pub fn to_options(&self) -> CursorOptions {
        let mut criteria = Vec::new();
        if let Some(id) = self.id {
            criteria.push(Criterion::Id(NodeId(id)));
        }
        if let Some(slug) = &self.slug {
            criteria.push(Criterion::Slug(slug.clone()));
        }
        if let Some(path) = &self.path {
            criteria.push(Criterion::Path(path.clone()));
        }
        for (name, value) in &self.fields {
            criteria.push(Criterion::Field(name.clone(), value.clone()));
        }
        CursorOptions {
            criteria,
            published: self.published,
            trash: self.trash,
            ancestors: self.ancestors,
            ancestors_children: self.ancestors_children,
            children: self.children,
            skip: self.skip,
            limit: self.limit,
        }
    }
}

/// Query pages.
pub fn cmd_find(config: &Config, json_mode: bool, args: &FindArgs) -> Result<(), TreeError> {
    let session = load_or_create_session(&config.storage)?;
    let ctx = cli_context();
    let views = session.find(&ctx).with_options(args.to_options()).to_vec()?;

    if json_mode {
        let pages: Vec<PageJson> = views.iter().map(PageJson::from).collect();
        print_json(&serde_json::json!({ "pages": pages }));
        return Ok(());
    }

    if views.is_empty() {
        println!("No pages found");
        return Ok(());
    }

    println!("Found {} page(s):", views.len());
    for view in &views {
        print_node(&view.node);
        for ancestor in &view.ancestors {
            println!("    ancestor {} [{}]", ancestor.node.path, ancestor.node.id);
            for child in &ancestor.children {
                println!("      child {} [{}]", child.path, child.id);
            }
        }
        for child in &view.children {
            println!("    child {} [{}]", child.path, child.id);
        }
    }
    Ok(())
}

// =============================================================================
// WRITE COMMANDS
// =============================================================================

/// Insert a page under `parent`.
pub fn cmd_insert(
    config: &Config,
    json_mode: bool,
    parent: u64,
    draft: NodeDraft,
) -> Result<(), TreeError> {
    let mut session = load_or_create_session(&config.storage)?;
    let node = session.insert(&cli_context(), NodeId(parent), draft)?;
    save_session(&session, &config.storage.database)?;
    report_write(json_mode, "Inserted", &node);
    Ok(())
}

/// Move a page, or print the plan with `dry_run`.
pub fn cmd_move(
    config: &Config,
    json_mode: bool,
    node: u64,
    target: u64,
    position: Position,
    dry_run: bool,
) -> Result<(), TreeError> {
    let mut session = load_or_create_session(&config.storage)?;
    let ctx = cli_context();

    if dry_run {
        let plan = session.plan_move(&ctx, NodeId(node), NodeId(target), position)?;
        if json_mode {
            let writes: Vec<PageJson> = plan.writes.iter().map(PageJson::from).collect();
            print_json(&serde_json::json!({
                "moved": PageJson::from(&plan.moved),
                "writes": writes,
            }));
        } else if plan.is_empty() {
            println!("Nothing to do: node {} is already in place", node);
        } else {
            println!("Move would rewrite {} record(s):", plan.len());
            for write in &plan.writes {
                print_node(write);
            }
        }
        return Ok(());
    }

    let moved = session.move_node(&ctx, NodeId(node), NodeId(target), position)?;
    save_session(&session, &config.storage.database)?;
    report_write(json_mode, "Moved", &moved);
    Ok(())
}

/// Move a page into the trash container.
pub fn cmd_trash(config: &Config, json_mode: bool, node: u64) -> Result<(), TreeError> {
    let mut session = load_or_create_session(&config.storage)?;
    let trashed = session.trash(&cli_context(), NodeId(node))?;
    save_session(&session, &config.storage.database)?;
    report_write(json_mode, "Trashed", &trashed);
    Ok(())
}

fn report_write(json_mode: bool, action: &str, node: &Node) {
    if json_mode {
        print_json(&serde_json::json!({ "page": PageJson::from(node) }));
    } else {
        println!("{}:", action);
        print_node(node);
    }
}

// =============================================================================
// INTEGRITY COMMANDS
// =============================================================================

/// Verify tree invariants. Fails when any violation is found.
pub fn cmd_check(config: &Config, json_mode: bool) -> Result<(), TreeError> {
    let session = load_or_create_session(&config.storage)?;
    let violations = session.verify()?;

    if json_mode {
        print_json(&serde_json::json!({
            "consistent": violations.is_empty(),
            "violations": violations,
        }));
    } else if violations.is_empty() {
        println!("Tree is consistent ({} nodes)", session.node_count()?);
    } else {
        println!("Found {} violation(s):", violations.len());
        for violation in &violations {
            println!("  - {}", violation);
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(TreeError::Store(format!(
            "{} integrity violation(s) found",
            violations.len()
        )))
    }
}

/// Close rank gaps in every sibling group.
pub fn cmd_repair(config: &Config) -> Result<(), TreeError> {
    let mut session = load_or_create_session(&config.storage)?;
    let changed = session.repair()?;
    save_session(&session, &config.storage.database)?;
    println!("Renumbered {} record(s)", changed);
    Ok(())
}

// =============================================================================
// EXPORT / IMPORT COMMANDS
// =============================================================================

/// Export the tree as a snapshot file.
pub fn cmd_export(config: &Config, output: &Path) -> Result<(), TreeError> {
    let validated_output = validate_output_path(output)?;

    let session = load_or_create_session(&config.storage)?;
    let snapshot = session.snapshot()?;
    let data = snapshot_to_bytes(&snapshot)?;

    std::fs::write(&validated_output, &data)
        .map_err(|e| TreeError::Store(format!("Write file: {}", e)))?;

    println!(
        "Exported {} nodes ({} bytes) to {:?}",
        snapshot.nodes.len(),
        data.len(),
        validated_output
    );
    Ok(())
}

/// Replace the tree with a snapshot file.
pub fn cmd_import(config: &Config, input: &Path) -> Result<(), TreeError> {
    let validated_path = validate_file_path(input)?;
    validate_file_size(&validated_path, MAX_IMPORT_FILE_SIZE)?;

    let data = std::fs::read(&validated_path)
        .map_err(|e| TreeError::Store(format!("Read file: {}", e)))?;
    let snapshot = snapshot_from_bytes(&data)?;
    let count = snapshot.nodes.len();

    let mut session = load_or_create_session(&config.storage)?;
    session.restore(snapshot)?;
    save_session(&session, &config.storage.database)?;

    let violations = session.verify()?;
    if !violations.is_empty() {
        tracing::warn!(
            violations = violations.len(),
            "imported snapshot does not satisfy tree invariants"
        );
    }

    println!("Imported {} nodes", count);
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the configured database, or start an empty tree if a snapshot file
/// does not exist yet.
pub fn load_or_create_session(storage: &StorageConfig) -> Result<Session, TreeError> {
    let db_path = &storage.database;
    match storage.backend {
        Backend::Redb => Session::with_redb(db_path),
        Backend::File => {
            if !db_path.exists() {
                return Ok(Session::new());
            }
            let data = std::fs::read(db_path)
                .map_err(|e| TreeError::Store(format!("Read db: {}", e)))?;
            let snapshot = snapshot_from_bytes(&data)?;
            Ok(Session::with_store(snapshot.into_store()))
        }
    }
}

/// Persist a session to its snapshot file. A redb session is already durable.
pub fn save_session(session: &Session, db_path: &Path) -> Result<(), TreeError> {
    if session.is_persistent() {
        return Ok(());
    }
    let data = snapshot_to_bytes(&session.snapshot()?)?;
    std::fs::write(db_path, &data).map_err(|e| TreeError::Store(format!("Write db: {}", e)))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn file_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.storage.database = dir.join("tree.snap");
        config.storage.backend = Backend::File;
        config
    }

    fn root_id(config: &Config) -> u64 {
        let session = load_or_create_session(&config.storage).expect("load");
        session
            .store()
            .get_by_path("/")
            .expect("get")
            .map(|n| n.id.0)
            .expect("root")
    }

    #[test]
    fn file_backend_persists_between_commands() {
        let temp = tempdir().expect("temp dir");
        let config = file_config(temp.path());
        cmd_init(&config, false).expect("init");
        assert!(cmd_init(&config, false).is_err(), "second init needs --force");

        let root = root_id(&config);
        cmd_insert(&config, false, root, NodeDraft::new("news")).expect("insert");

        let session = load_or_create_session(&config.storage).expect("reload");
        let news = session
            .store()
            .get_by_path("/news")
            .expect("get")
            .expect("news");
        assert_eq!(news.rank, 1);

        cmd_trash(&config, false, news.id.0).expect("trash");
        let session = load_or_create_session(&config.storage).expect("reload");
        assert!(session
            .store()
            .get_by_path("/trash/news")
            .expect("get")
            .is_some());
        cmd_check(&config, true).expect("consistent");
    }

    #[test]
    fn redb_backend_init_and_move() {
        let temp = tempdir().expect("temp dir");
        let mut config = Config::default();
        config.storage.database = temp.path().join("tree.redb");
        cmd_init(&config, false).expect("init");

        let root = root_id(&config);
        let mut session = load_or_create_session(&config.storage).expect("open");
        let a = session
            .insert(&cli_context(), NodeId(root), NodeDraft::new("a"))
            .expect("insert");
        let b = session
            .insert(&cli_context(), NodeId(root), NodeDraft::new("b"))
            .expect("insert");
        drop(session);

        cmd_move(&config, false, b.id.0, a.id.0, Position::Inside, true).expect("dry run");
        let session = load_or_create_session(&config.storage).expect("open");
        assert!(session.store().get_by_path("/b").expect("get").is_some());
        drop(session);

        cmd_move(&config, false, b.id.0, a.id.0, Position::Inside, false).expect("move");
        let session = load_or_create_session(&config.storage).expect("open");
        assert!(session.store().get_by_path("/a/b").expect("get").is_some());
    }

    #[test]
    fn export_then_import_into_fresh_database() {
        let temp = tempdir().expect("temp dir");
        let config = file_config(temp.path());
        cmd_init(&config, false).expect("init");
        let root = root_id(&config);
        cmd_insert(&config, false, root, NodeDraft::new("about")).expect("insert");

        let export_path = temp.path().join("export.ptre");
        cmd_export(&config, &export_path).expect("export");

        let mut other = Config::default();
        other.storage.database = temp.path().join("other.redb");
        cmd_import(&other, &export_path).expect("import");
        let session = load_or_create_session(&other.storage).expect("open");
        assert_eq!(session.node_count().expect("count"), 3);
        assert!(session.verify().expect("verify").is_empty());
    }

    #[test]
    fn import_rejects_missing_and_garbage_files() {
        let temp = tempdir().expect("temp dir");
        let config = file_config(temp.path());
        assert!(cmd_import(&config, &temp.path().join("missing")).is_err());

        let garbage = temp.path().join("garbage");
        std::fs::write(&garbage, b"not a snapshot").expect("write");
        assert!(matches!(
            cmd_import(&config, &garbage),
            Err(TreeError::Serialization(_))
        ));
    }

    #[test]
    fn import_rejects_duplicate_paths() {
        let temp = tempdir().expect("temp dir");
        let config = file_config(temp.path());
        cmd_init(&config, false).expect("init");
        let root = root_id(&config);
        cmd_insert(&config, false, root, NodeDraft::new("a")).expect("insert");

        let session = load_or_create_session(&config.storage).expect("load");
        let mut snapshot = session.snapshot().expect("snapshot");
        let mut twin = session
            .store()
            .get_by_path("/a")
            .expect("get")
            .expect("a");
        twin.id = NodeId(snapshot.next_node_id);
        snapshot.nodes.push(twin);
        let bad = temp.path().join("twins.ptre");
        std::fs::write(&bad, snapshot_to_bytes(&snapshot).expect("encode")).expect("write");

        assert!(matches!(
            cmd_import(&config, &bad),
            Err(TreeError::Serialization(_))
        ));
        let session = load_or_create_session(&config.storage).expect("reload");
        assert_eq!(session.node_count().expect("count"), 3);
    }

    #[test]
    fn find_args_build_criteria() {
        let args = FindArgs {
            id: None,
            slug: Some("child".to_string()),
            path: None,
            fields: vec![("type".to_string(), "page".to_string())],
            published: Filter::Any,
            trash: Filter::Only(false),
            ancestors: Ancestors::All,
            ancestors_children: true,
            children: false,
            skip: 0,
            limit: Some(5),
        };
        let options = args.to_options();
        assert_eq!(options.criteria.len(), 2);
        assert_eq!(options.ancestors, Ancestors::All);
        assert!(options.validate().is_ok());
    }
}
