use daybook_core::{DaybookResult, ExitCode};
use daybook_fs::{
    ProfileSettings, apply_profile_settings, init_workspace, list_profiles, load_config,
    resolve_profile, save_config, set_active_profile,
};
use serde_json::json;

use crate::{GlobalOptions, InitOutput, ProfileChangedOutput, ProfileCommand, open_workspace, print_json};

pub(crate) fn cmd_init(globals: &GlobalOptions) -> DaybookResult<ExitCode> {
    let result = init_workspace(globals.workspace.as_deref(), globals.server.as_deref())?;

    let output = InitOutput {
        workspace: result.paths.root.display().to_string(),
        created: result
            .created
            .iter()
            .map(|path| path.display().to_string())
            .collect(),
    };

    if globals.json {
        print_json(&json!({"ok": true, "result": output}))?;
    } else {
        println!("Workspace initialized: {}", output.workspace);
        if output.created.is_empty() {
            println!("Created: none");
        } else {
            println!("Created:");
            for path in &output.created {
                println!("  - {path}");
            }
        }
    }

    Ok(ExitCode::Success)
}

pub(crate) fn cmd_profile(command: ProfileCommand, globals: &GlobalOptions) -> DaybookResult<ExitCode> {
    let paths = open_workspace(globals)?;
    let mut config = load_config(&paths)?;

    match command {
        ProfileCommand::List => {
            let profiles = list_profiles(&config);
            if globals.json {
                print_json(
                    &json!({"ok": true, "result": {"active_profile": config.active_profile, "profiles": profiles}}),
                )?;
            } else {
                println!("Active profile: {}", config.active_profile);
                for profile in profiles {
                    let marker = if profile.active { "*" } else { " " };
                    let key = if profile.has_api_key { "key" } else { "no key" };
                    println!(
                        "{} {} ({}, {}, {})",
                        marker,
                        profile.name,
                        profile.server,
                        profile.mode.as_str(),
                        key
                    );
                }
            }

            Ok(ExitCode::Success)
        }
        ProfileCommand::Use { name } => {
            set_active_profile(&mut config, &name)?;
            save_config(&paths, &config)?;

            let resolved = resolve_profile(&config, Some(&name), globals.server.as_deref())?;
            let output = ProfileChangedOutput {
                profile: resolved.name,
                server: resolved.server,
                mode: resolved.mode,
            };

            if globals.json {
                print_json(&json!({"ok": true, "result": output}))?;
            } else {
                println!(
                    "Active profile set to '{}' ({})",
                    output.profile, output.server
                );
            }

            Ok(ExitCode::Success)
        }
        ProfileCommand::Set {
            name,
            api_key,
            mode,
            page_size,
            connect_timeout,
        } => {
            let target_profile = name
                .or_else(|| globals.profile.clone())
                .unwrap_or_else(|| config.active_profile.clone());
            let settings = ProfileSettings {
                server: globals.server.clone(),
                api_key,
                mode,
                page_size,
                connect_timeout_secs: connect_timeout,
            };
            apply_profile_settings(&mut config, &target_profile, &settings)?;
            save_config(&paths, &config)?;

            let resolved = resolve_profile(&config, Some(&target_profile), None)?;
            let output = ProfileChangedOutput {
                profile: resolved.name,
                server: resolved.server,
                mode: resolved.mode,
            };

            if globals.json {
                print_json(&json!({"ok": true, "result": output}))?;
            } else {
                println!(
                    "Profile '{}' updated ({}, {})",
                    output.profile,
                    output.server,
                    output.mode.as_str()
                );
            }

            Ok(ExitCode::Success)
        }
    }
}
