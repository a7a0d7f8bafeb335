use anyhow::{bail, Context, Result};
use log::debug;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// A bind mount into a session container.
pub struct Mount {
    pub source: PathBuf,
    pub target: String,
    pub readonly: bool,
}

/// Check if a Docker image with the given tag exists.
pub fn image_exists(tag: &str) -> Result<bool> {
    let status = Command::new("docker")
        .args(["image", "inspect", tag])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("Failed to run docker image inspect")?;

    Ok(status.success())
}

/// Check if a container with the given name exists and is running.
pub fn container_is_running(name: &str) -> Result<bool> {
    let output = Command::new("docker")
        .args(["container", "inspect", "-f", "{{.State.Running}}", name])
        .output()
        .context("Failed to run docker container inspect")?;

    if !output.status.success() {
        return Ok(false);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.trim() == "true")
}

/// Check if a container with the given name exists (running or stopped).
pub fn container_exists(name: &str) -> Result<bool> {
    let status = Command::new("docker")
        .args(["container", "inspect", name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("Failed to run docker container inspect")?;

    Ok(status.success())
}

/// Remove a container by name.
pub fn remove_container(name: &str) -> Result<()> {
    let status = Command::new("docker")
        .args(["rm", "-f", name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("Failed to run docker rm")?;

    if !status.success() {
        bail!("Failed to remove container: {}", name);
    }

    Ok(())
}

/// Start a stopped container.
pub fn start_container(name: &str) -> Result<()> {
    let status = Command::new("docker")
        .args(["start", name])
        .stdout(Stdio::null())
        .status()
        .context("Failed to run docker start")?;

    if !status.success() {
        bail!("Failed to start container: {}", name);
    }

    Ok(())
}

/// Create and start a detached session container. The container idles on
/// `sleep infinity`; the operator's shell is attached separately with exec.
pub fn run_detached(
    name: &str,
    image: &str,
    user: (u32, u32),
    labels: &[String],
    mounts: &[Mount],
    workdir: &str,
) -> Result<()> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        name.to_string(),
        "--user".to_string(),
        format!("{}:{}", user.0, user.1),
    ];

    for label in labels {
        args.push("--label".to_string());
        args.push(label.clone());
    }

    for mount in mounts {
        let mut spec = format!(
            "type=bind,source={},target={}",
            mount.source.display(),
            mount.target
        );
        if mount.readonly {
            spec.push_str(",readonly");
        }
        args.push("--mount".to_string());
        args.push(spec);
    }

    args.extend(["--workdir".to_string(), workdir.to_string()]);
    args.push(image.to_string());
    args.extend(["sleep".to_string(), "infinity".to_string()]);

    debug!("docker {}", args.join(" "));

    let status = Command::new("docker")
        .args(&args)
        .stdout(Stdio::null())
        .status()
        .context("Failed to run docker container")?;

    if !status.success() {
        bail!("Failed to create container: {}", name);
    }

    Ok(())
}

/// Attach an interactive shell to a running container.
pub fn attach_shell(name: &str, shell: &str) -> Result<()> {
    use std::io::IsTerminal;

    let mut args = vec!["exec".to_string()];

    // Only use -it flags when stdin is a TTY
    if std::io::stdin().is_terminal() {
        args.push("-it".to_string());
    }

    args.push(name.to_string());
    args.push(shell.to_string());

    let status = Command::new("docker")
        .args(&args)
        .status()
        .context("Failed to exec in container")?;

    if !status.success() {
        bail!("Container shell exited with error");
    }

    Ok(())
}

/// List all containers with a specific label.
pub fn list_containers_with_label(label: &str) -> Result<Vec<String>> {
    let output = Command::new("docker")
        .args([
            "ps",
            "-a",
            "--filter",
            &format!("label={}", label),
            "--format",
            "{{.Names}}",
        ])
        .output()
        .context("Failed to list containers")?;

    if !output.status.success() {
        bail!("Failed to list containers");
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().map(String::from).collect())
}
