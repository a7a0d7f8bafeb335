//! Lifecycle of the sandbox attached to a session: container identity,
//! mounts, and the thin orchestration over the container runtime.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use strum::Display;

use crate::config::{self, Config, UserInfo};
use crate::docker::{self, Mount};
use crate::git;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ContainerState {
    Running,
    Stopped,
    NotFound,
}

/// Per-session status: container state, clone presence, and the clone's
/// clean/dirty state.
#[derive(Debug, Serialize)]
pub struct SessionStatus {
    pub name: String,
    pub container: ContainerState,
    pub clone_exists: bool,
    /// Whether the clone has any staged or unstaged diff. Absent when there
    /// is no clone to inspect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dirty: Option<bool>,
}

fn container_state(container: &str) -> Result<ContainerState> {
    if docker::container_is_running(container)? {
        Ok(ContainerState::Running)
    } else if docker::container_exists(container)? {
        Ok(ContainerState::Stopped)
    } else {
        Ok(ContainerState::NotFound)
    }
}

/// Attach to the session's sandbox, starting or creating it as needed.
pub fn ensure(cfg: &Config, user: &UserInfo, name: &str, image: &str) -> Result<()> {
    let container = cfg.container_name(name);
    let shell = if user.uses_fish() { "fish" } else { "bash" };

    match container_state(&container)? {
        ContainerState::Running => {
            eprintln!("Attaching to running container: {}", container);
        }
        ContainerState::Stopped => {
            eprintln!("Starting container: {}", container);
            docker::start_container(&container)?;
        }
        ContainerState::NotFound => {
            let creds = config::credential_paths()?;
            let mounts = vec![
                Mount {
                    source: cfg.clone_path(name),
                    target: "/workspace".to_string(),
                    readonly: false,
                },
                // Credential pair: read-write, isolated per installation from
                // the operator's own credentials.
                Mount {
                    source: creds.claude_json,
                    target: format!("/home/{}/.claude.json", user.username),
                    readonly: false,
                },
                Mount {
                    source: creds.claude_dir,
                    target: format!("/home/{}/.claude", user.username),
                    readonly: false,
                },
            ];
            let labels = vec!["capsule=true".to_string(), cfg.repo_label()];

            eprintln!("Creating container: {}", container);
            docker::run_detached(
                &container,
                image,
                (user.uid, user.gid),
                &labels,
                &mounts,
                "/workspace",
            )?;
        }
    }

    docker::attach_shell(&container, shell)
}

/// Remove the session's container. The clone is retained. Removing an
/// absent container is a warning, not an error.
pub fn remove(cfg: &Config, name: &str) -> Result<()> {
    let container = cfg.container_name(name);
    if docker::container_exists(&container)? {
        docker::remove_container(&container)?;
        eprintln!("Removed container: {}", container);
    } else {
        eprintln!("Warning: no container for session '{}'", name);
    }
    Ok(())
}

/// Remove the session's container and its clone. The session branch in the
/// source repository is left alone.
pub fn clean(cfg: &Config, name: &str) -> Result<()> {
    remove(cfg, name)?;

    let clone = cfg.clone_path(name);
    if clone.exists() {
        std::fs::remove_dir_all(&clone)
            .with_context(|| format!("Failed to remove {}", clone.display()))?;
        eprintln!("Removed clone: {}", clone.display());
    }
    Ok(())
}

/// Status of one session.
pub fn status(cfg: &Config, name: &str) -> Result<SessionStatus> {
    let container = cfg.container_name(name);
    let clone = cfg.clone_path(name);
    let clone_exists = clone.exists();
    let dirty = if clone_exists {
        Some(git::has_uncommitted_changes(&clone)?)
    } else {
        None
    };

    Ok(SessionStatus {
        name: name.to_string(),
        container: container_state(&container)?,
        clone_exists,
        dirty,
    })
}

/// All sessions of this repository, by container label.
pub fn list(cfg: &Config) -> Result<Vec<SessionStatus>> {
    let mut sessions = Vec::new();
    for container in docker::list_containers_with_label(&cfg.repo_label())? {
        let name = container
            .strip_prefix("capsule-")
            .unwrap_or(&container)
            .to_string();
        sessions.push(status(cfg, &name)?);
    }
    sessions.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(sessions)
}

/// Fetch the source repository's full history into the clone from an
/// explicit remote URL. Networked, and only safe while the sandbox is not
/// using the mounted directory.
pub fn refresh(cfg: &Config, name: &str) -> Result<()> {
    let url = match cfg.repo_url.as_deref() {
        Some(url) => url,
        None => bail!("REPO_URL is not set; refresh needs an explicit remote URL"),
    };

    let clone = cfg.clone_path(name);
    if !clone.exists() {
        bail!("No clone for session '{}' at {}", name, clone.display());
    }

    let container = cfg.container_name(name);
    if docker::container_is_running(&container)? {
        bail!(
            "Session '{}' is running; stop it before refreshing (capsule rm {})",
            name,
            name
        );
    }

    eprintln!("Fetching full history from {}", url);
    git::fetch_url(&clone, url).context("Full-history fetch failed")
}
