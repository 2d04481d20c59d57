use super::cli::DockerCli;
use crate::error::Result;

/// Registry logins
#[derive(Clone)]
pub struct HubOps {
    cli: DockerCli,
}

impl HubOps {
    pub fn new(cli: DockerCli) -> Self {
        Self { cli }
    }

    /// Arguments of `docker login`; a registry without a dot means Docker Hub
    pub fn login_args(registry: &str, username: &str) -> Vec<String> {
        let mut args = vec!["login".to_string()];
        if registry.contains('.') {
            args.push(registry.to_string());
        }
        args.push("-u".to_string());
        args.push(username.to_string());
        args.push("--password-stdin".to_string());
        args
    }

    /// Log in to a registry. Nothing happens unless both credentials are set.
    ///
    /// The password is written to the process's stdin so it never appears on
    /// the command line.
    pub async fn login(&self, registry: &str, username: &str, password: &str) -> Result<()> {
        if username.is_empty() || password.is_empty() {
            tracing::debug!("Skipping docker login: no credentials for {}", registry);
            return Ok(());
        }

        let command = self
            .cli
            .command(&Self::login_args(registry, username))
            .stdin(password.to_string())
            .combine_stderr(true)
            .build();
        self.cli.check(command).await?;
        tracing::info!("Logged in to {}", if registry.contains('.') { registry } else { "Docker Hub" });
        Ok(())
    }
}
