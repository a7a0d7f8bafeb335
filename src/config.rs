use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Default image used for session containers.
pub const DEFAULT_IMAGE: &str = "capsule:latest";

/// Resolved configuration, built once in `cli::run` and passed by reference
/// into every component. No component reads the environment directly.
#[derive(Debug, Clone)]
pub struct Config {
    /// The operator's real repository.
    pub repo_path: PathBuf,
    /// Directory under which isolated clones are created, one per session.
    pub clone_prefix: PathBuf,
    /// Remote URL, only needed for `refresh`.
    pub repo_url: Option<String>,
}

impl Config {
    pub fn new(
        repo_path: PathBuf,
        clone_prefix: PathBuf,
        repo_url: Option<String>,
    ) -> Result<Self> {
        if !repo_path.is_dir() {
            bail!("Repository path does not exist: {}", repo_path.display());
        }
        if !repo_path.join(".git").exists() {
            bail!("Not a git repository: {}", repo_path.display());
        }
        Ok(Config {
            repo_path,
            clone_prefix,
            repo_url,
        })
    }

    /// The isolated clone for a session lives at `<clone_prefix>/<name>`.
    pub fn clone_path(&self, name: &str) -> PathBuf {
        self.clone_prefix.join(name)
    }

    /// Container name for a session. The session name doubles as the branch
    /// name, so both namespaces stay in lockstep.
    pub fn container_name(&self, name: &str) -> String {
        format!("capsule-{}", name)
    }

    /// Label that scopes containers to this repository, so `list` does not
    /// pick up sessions of other checkouts.
    pub fn repo_label(&self) -> String {
        format!("capsule.repo={}", hash_path(&self.repo_path))
    }
}

/// Validate a session name. It becomes a branch name, a container name and a
/// directory name, so keep it to a conservative character set.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("Session name must not be empty");
    }
    let ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !ok || name.starts_with('-') {
        bail!(
            "Invalid session name '{}': use letters, digits, '-' and '_'",
            name
        );
    }
    Ok(())
}

/// Compute a short hash of a path for use in container labels.
pub fn hash_path(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8]) // Use first 8 bytes (16 hex chars)
}

/// Per-installation credential pair mounted read-write into each sandbox,
/// kept apart from the operator's own credentials.
pub struct CredentialPaths {
    pub claude_json: PathBuf,
    pub claude_dir: PathBuf,
}

/// Get (and create on demand) the credential pair for this installation.
/// Lives under `<config_dir>/capsule/`.
pub fn credential_paths() -> Result<CredentialPaths> {
    let base = dirs::config_dir()
        .context("Could not determine config directory")?
        .join("capsule");
    std::fs::create_dir_all(&base)
        .with_context(|| format!("Failed to create {}", base.display()))?;

    let claude_json = base.join("claude.json");
    if !claude_json.exists() {
        std::fs::write(&claude_json, "{}\n")
            .with_context(|| format!("Failed to create {}", claude_json.display()))?;
    }

    let claude_dir = base.join("claude");
    std::fs::create_dir_all(&claude_dir)
        .with_context(|| format!("Failed to create {}", claude_dir.display()))?;

    Ok(CredentialPaths {
        claude_json,
        claude_dir,
    })
}

/// Get current user information.
pub struct UserInfo {
    pub uid: u32,
    pub gid: u32,
    pub username: String,
    pub shell: String,
}

impl UserInfo {
    pub fn current() -> Result<Self> {
        let uid = nix::unistd::getuid().as_raw();
        let gid = nix::unistd::getgid().as_raw();

        let username = std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .unwrap_or_else(|_| format!("user{}", uid));

        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string());

        Ok(UserInfo {
            uid,
            gid,
            username,
            shell,
        })
    }

    pub fn uses_fish(&self) -> bool {
        self.shell.ends_with("/fish") || self.shell == "fish"
    }
}
