//! Container environment rebuild: stop, rebuild without cache, start.
//!
//! The three compose invocations run one after another. The first one that
//! fails to launch or exits non-zero ends the rebuild; later steps never run.

use anyhow::{Context, Result};
use std::fmt;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::RebuildConfig;
use crate::error::RebuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildStep {
    Stop,
    Build,
    Start,
}

impl RebuildStep {
    pub const ALL: [RebuildStep; 3] = [RebuildStep::Stop, RebuildStep::Build, RebuildStep::Start];

    pub fn as_str(&self) -> &'static str {
        match self {
            RebuildStep::Stop => "stop",
            RebuildStep::Build => "build",
            RebuildStep::Start => "start",
        }
    }

    fn compose_args(&self) -> &'static [&'static str] {
        match self {
            RebuildStep::Stop => &["down"],
            RebuildStep::Build => &["build", "--no-cache"],
            RebuildStep::Start => &["up", "-d"],
        }
    }
}

/// One fully-resolved command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCommand {
    pub step: RebuildStep,
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for ComposeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// The command lines a rebuild would run, in order.
pub fn commands(config: &RebuildConfig) -> Result<Vec<ComposeCommand>, RebuildError> {
    let (program, base_args) = config
        .compose_command
        .split_first()
        .ok_or(RebuildError::EmptyComposeCommand)?;

    let mut prefix: Vec<String> = base_args.to_vec();
    if let Some(file) = &config.compose_file {
        prefix.push("-f".to_string());
        prefix.push(file.display().to_string());
    }

    Ok(RebuildStep::ALL
        .iter()
        .map(|step| ComposeCommand {
            step: *step,
            program: program.clone(),
            args: prefix
                .iter()
                .cloned()
                .chain(step.compose_args().iter().map(|a| a.to_string()))
                .collect(),
        })
        .collect())
}

/// Run the rebuild. Returns the steps that completed, which is all three on
/// success.
pub async fn rebuild(config: &RebuildConfig) -> Result<Vec<RebuildStep>> {
    let mut completed = Vec::with_capacity(RebuildStep::ALL.len());

    for command in commands(config)? {
        info!("Rebuild {}: {}", command.step.as_str(), command);

        let status = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&config.service_dir)
            .stdin(Stdio::null())
            .status()
            .await
            .with_context(|| format!("Failed to launch `{}`", command))?;

        if !status.success() {
            return Err(RebuildError::StepFailed {
                step: command.step.as_str(),
                code: status.code(),
            }
            .into());
        }

        debug!("Rebuild {} finished", command.step.as_str());
        completed.push(command.step);
    }

    info!("Rebuild complete");
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(command: &[&str]) -> RebuildConfig {
        RebuildConfig {
            compose_command: command.iter().map(|s| s.to_string()).collect(),
            compose_file: None,
            service_dir: PathBuf::from("."),
        }
    }

    #[test]
    fn test_commands_in_order() {
        let mut cfg = config(&["docker", "compose"]);
        cfg.compose_file = Some(PathBuf::from("docker-compose.yml"));

        let lines: Vec<String> = commands(&cfg).unwrap().iter().map(|c| c.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "docker compose -f docker-compose.yml down",
                "docker compose -f docker-compose.yml build --no-cache",
                "docker compose -f docker-compose.yml up -d",
            ]
        );
    }

    #[test]
    fn test_standalone_compose_binary() {
        let cmds = commands(&config(&["docker-compose"])).unwrap();
        assert_eq!(cmds[1].program, "docker-compose");
        assert_eq!(cmds[1].args, vec!["build", "--no-cache"]);
    }

    #[test]
    fn test_empty_command_rejected() {
        assert_eq!(commands(&config(&[])), Err(RebuildError::EmptyComposeCommand));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rebuild_runs_all_steps() {
        let completed = rebuild(&config(&["true"])).await.unwrap();
        assert_eq!(completed, RebuildStep::ALL.to_vec());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rebuild_stops_at_first_failure() {
        let err = rebuild(&config(&["false"])).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RebuildError>(),
            Some(RebuildError::StepFailed { step: "stop", .. })
        ));
    }

    #[tokio::test]
    async fn test_rebuild_reports_missing_program() {
        let result = rebuild(&config(&["lazyfood-no-such-compose-binary"])).await;
        assert!(result.is_err());
    }
}
