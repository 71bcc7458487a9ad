mod config;
mod workspace;

pub use config::{
    API_KEY_ENV, DEFAULT_PROFILE, DEFAULT_SERVER_URL, ProfileConfig, ProfileSettings, ProfileView,
    ResolvedProfile, WorkspaceConfig, apply_profile_settings, list_profiles, load_config,
    resolve_profile, save_config, set_active_profile, set_profile_server,
};
pub use workspace::{
    WORKSPACE_ENV, WorkspaceInitResult, WorkspacePaths, init_workspace, resolve_workspace,
};
