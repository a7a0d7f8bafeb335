use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::changes::{self, ChangeSet};
use crate::config::{self, Config, UserInfo, DEFAULT_IMAGE};
use crate::docker;
use crate::provision::{self, UntrackedPolicy};
use crate::session;
use crate::sync::{self, SyncOutcome};

#[derive(Parser)]
#[command(name = "capsule")]
#[command(about = "Container-based coding sessions, synced back through git-native patches")]
pub struct Cli {
    #[command(flatten)]
    pub locations: Locations,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct Locations {
    /// Source repository
    #[arg(long = "repo", env = "REPO_PATH", value_name = "PATH", global = true)]
    pub repo: Option<PathBuf>,

    /// Directory under which isolated clones are kept
    #[arg(long = "clones", env = "CLONE_PATH_PREFIX", value_name = "PATH", global = true)]
    pub clones: Option<PathBuf>,

    /// Remote URL, only used by `refresh`
    #[arg(long = "repo-url", env = "REPO_URL", value_name = "URL", global = true)]
    pub repo_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision a session and enter its sandbox (created if needed)
    Run {
        /// Session name; doubles as the branch name
        name: String,

        /// Branch to mirror into the session
        #[arg(long = "from", value_name = "BRANCH", default_value = "main")]
        from: String,

        /// Container image for the sandbox
        #[arg(long, value_name = "TAG", default_value = DEFAULT_IMAGE)]
        image: String,
    },

    /// Remove a session's sandbox, keeping its clone
    Rm {
        /// Name of the session
        name: String,
    },

    /// Remove a session's sandbox and its clone
    Clean {
        /// Name of the session
        name: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Show the session's changes against its root commit
    Diff {
        /// Name of the session
        name: String,

        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Stage the session's changes onto its branch in the source repository
    Patch {
        /// Name of the session
        name: String,
    },

    /// List sessions for this repository
    #[command(visible_alias = "ls")]
    List {
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Show one session's status
    Status {
        /// Name of the session
        name: String,

        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Fetch the full source history into a stopped session's clone
    Refresh {
        /// Name of the session
        name: String,
    },
}

pub fn run() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = build_config(cli.locations)?;

    match cli.command {
        Commands::Run { name, from, image } => {
            config::validate_name(&name)?;
            if !docker::image_exists(&image)? {
                bail!(
                    "Image '{}' not found; build it with `docker build -t {} .`",
                    image,
                    image
                );
            }
            provision::provision(&cfg, &name, &from, UntrackedPolicy::Prompt)?;
            let user = UserInfo::current()?;
            session::ensure(&cfg, &user, &name, &image)
        }

        Commands::Rm { name } => session::remove(&cfg, &name),

        Commands::Clean { name, force } => {
            if !force && !confirm(&format!("Remove sandbox and clone for '{}'?", name))? {
                eprintln!("Aborted");
                return Ok(());
            }
            session::clean(&cfg, &name)
        }

        Commands::Diff { name, json } => {
            let clone = cfg.clone_path(&name);
            if !clone.exists() {
                bail!(
                    "No clone for session '{}' (run `capsule run {}` first)",
                    name,
                    name
                );
            }
            let set = changes::analyze(&clone)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&set)?);
            } else {
                print_change_set(&set);
            }
            Ok(())
        }

        Commands::Patch { name } => {
            config::validate_name(&name)?;
            match sync::sync(&cfg, &name)? {
                SyncOutcome::Applied => {
                    println!(
                        "Changes staged on branch '{}'; review and commit them there",
                        name
                    );
                }
                SyncOutcome::FellBack => {
                    println!("Changes staged on branch '{}' via bulk copy", name);
                }
                SyncOutcome::NoChanges => {}
            }
            Ok(())
        }

        Commands::List { json } => {
            let sessions = session::list(&cfg)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
                return Ok(());
            }
            if sessions.is_empty() {
                println!("No sessions found for this repository.");
                return Ok(());
            }
            println!("{:<20} {:<10} {:<6}", "NAME", "STATUS", "CLONE");
            println!("{}", "-".repeat(38));
            for s in sessions {
                let clone = if s.clone_exists { "yes" } else { "no" };
                println!("{:<20} {:<10} {:<6}", s.name, s.container.to_string(), clone);
            }
            Ok(())
        }

        Commands::Status { name, json } => {
            let status = session::status(&cfg, &name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }
            println!("session:   {}", status.name);
            println!("container: {}", status.container);
            println!(
                "clone:     {}",
                if status.clone_exists { "present" } else { "missing" }
            );
            if let Some(dirty) = status.dirty {
                println!("state:     {}", if dirty { "dirty" } else { "clean" });
            }
            Ok(())
        }

        Commands::Refresh { name } => session::refresh(&cfg, &name),
    }
}

fn build_config(locations: Locations) -> Result<Config> {
    let repo = locations
        .repo
        .ok_or_else(|| anyhow!("REPO_PATH is not set (use --repo or the environment)"))?;
    let clones = locations
        .clones
        .ok_or_else(|| anyhow!("CLONE_PATH_PREFIX is not set (use --clones or the environment)"))?;
    Config::new(repo, clones, locations.repo_url)
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().eq_ignore_ascii_case("y"))
}

fn print_change_set(set: &ChangeSet) {
    if set.is_empty() {
        println!("No changes");
        return;
    }

    for c in &set.renamed {
        let old = c.old_path.as_deref().unwrap_or("?");
        match c.similarity {
            Some(s) if s < 100 => println!(
                "  {}  {} -> {} ({}%)",
                "renamed:".cyan(),
                old,
                c.path,
                s
            ),
            _ => println!("  {}  {} -> {}", "renamed:".cyan(), old, c.path),
        }
    }
    for c in &set.added {
        match c.old_path.as_deref() {
            Some(origin) => println!(
                "  {} {} (copied from {})",
                "new file:".green(),
                c.path,
                origin
            ),
            None => println!("  {} {}", "new file:".green(), c.path),
        }
    }
    for c in &set.modified {
        println!("  {} {}", "modified:".yellow(), c.path);
    }
    for c in &set.deleted {
        println!("  {}  {}", "deleted:".red(), c.path);
    }

    println!();
    println!(
        "{} renamed, {} new, {} modified, {} deleted",
        set.renamed.len(),
        set.added.len(),
        set.modified.len(),
        set.deleted.len()
    );
}
