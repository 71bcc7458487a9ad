use crate::config::{DEFAULT_SERVER_URL, WorkspaceConfig, load_config, save_config};
use daybook_core::{DaybookError, DaybookResult};
use std::fs;
use std::path::{Path, PathBuf};

pub const WORKSPACE_ENV: &str = "DAYBOOK_WORKSPACE";

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub daybook_dir: PathBuf,
    pub config_path: PathBuf,
    pub state_db_path: PathBuf,
    pub attachments_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct WorkspaceInitResult {
    pub paths: WorkspacePaths,
    pub created: Vec<PathBuf>,
}

impl WorkspacePaths {
    pub fn from_root(root: PathBuf) -> Self {
        let daybook_dir = root.join(".daybook");

        Self {
            config_path: daybook_dir.join("config.toml"),
            state_db_path: daybook_dir.join("state.db"),
            attachments_dir: daybook_dir.join("attachments"),
            root,
            daybook_dir,
        }
    }
}

pub fn init_workspace(
    target: Option<&Path>,
    server: Option<&str>,
) -> DaybookResult<WorkspaceInitResult> {
    let root = workspace_root(target, "init")?;
    let paths = WorkspacePaths::from_root(root);
    let mut created = Vec::new();

    for dir in [&paths.root, &paths.daybook_dir, &paths.attachments_dir] {
        ensure(dir, Entry::Dir, &mut created)?;
    }
    ensure(&paths.state_db_path, Entry::File, &mut created)?;

    if paths.config_path.exists() {
        let _ = load_config(&paths)?;
    } else {
        let default_server = server.unwrap_or(DEFAULT_SERVER_URL);
        let config = WorkspaceConfig::with_default_server(default_server);
        save_config(&paths, &config)?;
        created.push(paths.config_path.clone());
    }

    Ok(WorkspaceInitResult { paths, created })
}

/// Locates an initialized workspace: explicit path, then `DAYBOOK_WORKSPACE`,
/// then the current directory.
pub fn resolve_workspace(explicit: Option<&Path>) -> DaybookResult<WorkspacePaths> {
    let root = workspace_root(explicit, "workspace lookup")?;

    let paths = WorkspacePaths::from_root(root);
    if !paths.daybook_dir.is_dir() {
        let root_display = paths.root.display();
        return Err(DaybookError::usage(format!(
            "workspace is not initialized at '{root_display}'; run `daybook init --workspace {root_display}` first"
        )));
    }

    Ok(paths)
}

fn workspace_root(explicit: Option<&Path>, purpose: &str) -> DaybookResult<PathBuf> {
    if let Some(path) = explicit {
        return absolutize(path);
    }

    if let Ok(from_env) = std::env::var(WORKSPACE_ENV)
        && !from_env.trim().is_empty()
    {
        return absolutize(Path::new(from_env.trim()));
    }

    std::env::current_dir().map_err(|err| {
        DaybookError::io(format!(
            "failed to resolve current directory for {purpose}: {err}"
        ))
    })
}

fn absolutize(path: &Path) -> DaybookResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    let cwd = std::env::current_dir().map_err(|err| {
        DaybookError::io(format!(
            "failed to resolve current directory for path: {err}"
        ))
    })?;

    Ok(cwd.join(path))
}

#[derive(Debug, Clone, Copy)]
enum Entry {
    Dir,
    File,
}

/// Creates `path` as `entry` unless it already exists with that shape.
fn ensure(path: &Path, entry: Entry, created: &mut Vec<PathBuf>) -> DaybookResult<()> {
    if path.exists() {
        let matches = match entry {
            Entry::Dir => path.is_dir(),
            Entry::File => path.is_file(),
        };
        if matches {
            return Ok(());
        }
        return Err(DaybookError::io(format!(
            "'{}' exists but is not a {}",
            path.display(),
            entry.noun()
        )));
    }

    let result = match entry {
        Entry::Dir => fs::create_dir_all(path),
        Entry::File => fs::write(path, []),
    };
    result.map_err(|err| {
        DaybookError::io(format!(
            "failed to create {} '{}': {err}",
            entry.noun(),
            path.display()
        ))
    })?;
    created.push(path.to_path_buf());
    Ok(())
}

impl Entry {
    fn noun(self) -> &'static str {
        match self {
            Entry::Dir => "directory",
            Entry::File => "file",
        }
    }
}
