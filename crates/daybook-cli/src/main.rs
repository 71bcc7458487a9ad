mod commands;
mod render;

use clap::{Parser, Subcommand};
use daybook_api::{RemoteBlobStore, RemoteConfig, RemoteNoteStore};
use daybook_core::{DaybookError, DaybookResult, ErrorKind, ExitCode, Mood, StoreMode};
use daybook_fs::{
    ResolvedProfile, WorkspacePaths, init_workspace, load_config, resolve_profile,
    resolve_workspace,
};
use daybook_store::{CacheLedger, LocalBlobStore, LocalNoteStore};
use daybook_sync::{Backend, SyncCoordinator, TimeWindow, select_store};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "daybook",
    version,
    about = "Timeline notes with optimistic sync",
    arg_required_else_help = true
)]
struct Cli {
    #[arg(long, global = true)]
    profile: Option<String>,

    #[arg(long, global = true, value_name = "PATH")]
    workspace: Option<PathBuf>,

    #[arg(long, global = true)]
    server: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    no_color: bool,

    #[arg(long, global = true)]
    debug: bool,

    #[arg(long, global = true)]
    yes: bool,

    /// Use the local store without probing the backend.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Init,
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
    /// Show the timeline, newest first.
    Feed {
        #[arg(long, default_value = "all")]
        time: TimeWindow,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        favorite: bool,
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    Tags,
    Compose {
        #[arg(long)]
        text: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long, default_value = "cloudy")]
        mood: Mood,
        #[arg(long = "image", value_name = "PATH")]
        images: Vec<PathBuf>,
    },
    Favorite {
        id: String,
    },
    Like {
        id: String,
    },
    Tag {
        #[command(subcommand)]
        command: TagCommand,
    },
    Comment {
        #[command(subcommand)]
        command: CommentCommand,
    },
    Delete {
        id: String,
    },
    /// Delete every note in the store.
    Clear,
}

#[derive(Debug, Subcommand)]
enum ProfileCommand {
    List,
    Use {
        name: String,
    },
    /// Update a profile; the global --server sets its backend URL.
    Set {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        mode: Option<StoreMode>,
        #[arg(long)]
        page_size: Option<usize>,
        #[arg(long, value_name = "SECONDS")]
        connect_timeout: Option<u64>,
    },
}

#[derive(Debug, Subcommand)]
enum TagCommand {
    Add { id: String, tag: String },
    Remove { id: String, tag: String },
}

#[derive(Debug, Subcommand)]
enum CommentCommand {
    Add {
        id: String,
        #[arg(long)]
        text: String,
    },
    Remove {
        id: String,
        comment_id: String,
    },
    List {
        id: String,
        #[arg(long)]
        oldest: bool,
    },
}

#[derive(Debug, Clone)]
struct GlobalOptions {
    profile: Option<String>,
    workspace: Option<PathBuf>,
    server: Option<String>,
    json: bool,
    yes: bool,
    offline: bool,
}

struct Session {
    profile: ResolvedProfile,
    backend: Backend,
    cache: CacheLedger,
}

impl Session {
    fn coordinator(&self) -> SyncCoordinator<'_> {
        SyncCoordinator::new(self.backend.notes.as_ref(), &self.cache)
            .with_page_size(self.profile.page_size)
    }
}

#[derive(Debug, Serialize)]
struct InitOutput {
    workspace: String,
    created: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ProfileChangedOutput {
    profile: String,
    server: String,
    mode: StoreMode,
}

fn main() {
    let cli = Cli::parse();
    configure_logging(cli.debug, cli.json, cli.no_color);

    let globals = GlobalOptions {
        profile: cli.profile,
        workspace: cli.workspace,
        server: cli.server,
        json: cli.json,
        yes: cli.yes,
        offline: cli.offline,
    };

    let result = run_command(cli.command, &globals);

    let exit = match result {
        Ok(code) => code,
        Err(error) => {
            render_error(&error, globals.json);
            error.exit_code()
        }
    };

    std::process::exit(exit.as_i32());
}

fn configure_logging(debug: bool, json: bool, no_color: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(false)
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(!no_color)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run_command(command: Command, globals: &GlobalOptions) -> DaybookResult<ExitCode> {
    match command {
        Command::Init => commands::profile::cmd_init(globals),
        Command::Profile { command } => commands::profile::cmd_profile(command, globals),
        Command::Feed {
            time,
            tags,
            favorite,
            pages,
        } => commands::feed::cmd_feed(time, tags, favorite, pages, globals),
        Command::Tags => commands::feed::cmd_tags(globals),
        Command::Compose {
            text,
            tags,
            mood,
            images,
        } => commands::note::cmd_compose(text, tags, mood, images, globals),
        Command::Favorite { id } => commands::note::cmd_favorite(&id, globals),
        Command::Like { id } => commands::note::cmd_like(&id, globals),
        Command::Tag { command } => commands::note::cmd_tag(command, globals),
        Command::Comment { command } => commands::note::cmd_comment(command, globals),
        Command::Delete { id } => commands::note::cmd_delete(&id, globals),
        Command::Clear => commands::note::cmd_clear(globals),
    }
}

/// Opens the workspace, creating it on first use.
fn open_workspace(globals: &GlobalOptions) -> DaybookResult<WorkspacePaths> {
    match resolve_workspace(globals.workspace.as_deref()) {
        Ok(paths) => Ok(paths),
        Err(err) if err.kind == ErrorKind::Usage => {
            debug!(error = %err, "initializing workspace on first use");
            let result = init_workspace(globals.workspace.as_deref(), globals.server.as_deref())?;
            Ok(result.paths)
        }
        Err(err) => Err(err),
    }
}

fn with_session<F>(globals: &GlobalOptions, run: F) -> DaybookResult<ExitCode>
where
    F: FnOnce(&Session) -> DaybookResult<ExitCode>,
{
    let paths = open_workspace(globals)?;
    let config = load_config(&paths)?;
    let profile = resolve_profile(
        &config,
        globals.profile.as_deref(),
        globals.server.as_deref(),
    )?;

    let mode = if globals.offline {
        StoreMode::Local
    } else {
        profile.mode
    };
    let remote_config = RemoteConfig::new(&profile.server)
        .with_api_key(profile.api_key.clone())
        .with_table(&profile.table)
        .with_bucket(&profile.bucket)
        .with_connect_timeout(Duration::from_secs(profile.connect_timeout_secs));

    let backend = select_store(
        mode,
        || {
            Ok(Backend::new(
                Box::new(RemoteNoteStore::new(&remote_config)?),
                Box::new(RemoteBlobStore::new(&remote_config)?),
            ))
        },
        || {
            Ok(Backend::new(
                Box::new(LocalNoteStore::from_workspace(&paths, &profile.name)),
                Box::new(LocalBlobStore::from_workspace(&paths)),
            ))
        },
    )?;
    debug!(profile = %profile.name, store = backend.label(), mode = mode.as_str(), "session ready");

    let cache = CacheLedger::from_workspace(&paths, &profile.name);
    run(&Session {
        profile,
        backend,
        cache,
    })
}

fn render_error(error: &DaybookError, json_output: bool) {
    if json_output {
        let payload = json!({
            "ok": false,
            "error": {
                "kind": error.kind,
                "message": &error.message,
            }
        });
        let serialized = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| {
            "{\"ok\":false,\"error\":{\"kind\":\"io\",\"message\":\"failed to serialize error\"}}".to_string()
        });
        eprintln!("{serialized}");
    } else {
        match error.kind {
            ErrorKind::Timeout => {
                eprintln!("error: the backend did not answer in time: {}", error.message)
            }
            ErrorKind::Connection => {
                eprintln!("error: could not reach the backend: {}", error.message)
            }
            _ => eprintln!("error: {}", error.message),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> DaybookResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| DaybookError::io(format!("failed to render JSON output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
