//! Remote server reached through the OpenSSH client
//!
//! Every operation spawns `ssh` (or `scp` for uploads) in batch mode, so key
//! based authentication has to be set up for the deploying user.

use std::path::Path;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::errors::DeployError;
use crate::remote::Server;

/// Exit status ssh reports when the connection itself failed
const SSH_CONNECTION_FAILED: i32 = 255;

#[derive(Debug, Clone)]
pub struct SshServer {
    hostname: String,
    username: Option<String>,
    port: u16,
    root_path: String,
}

impl SshServer {
    pub fn new(hostname: String, username: Option<String>, port: u16, root_path: String) -> Self {
        Self {
            hostname,
            username,
            port,
            root_path,
        }
    }

    /// `user@host` or `host`
    pub fn destination(&self) -> String {
        match &self.username {
            Some(user) if !user.is_empty() => format!("{}@{}", user, self.hostname),
            _ => self.hostname.clone(),
        }
    }

    /// Run `command` on the server, optionally feeding `input` to its stdin
    async fn run(&self, command: &str, input: Option<&[u8]>) -> Result<Output, DeployError> {
        debug!("ssh {}: {}", self.destination(), command);
        let mut child = Command::new("ssh")
            .args(["-o", "BatchMode=yes", "-p"])
            .arg(self.port.to_string())
            .arg(self.destination())
            .arg(command)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DeployError::ConnectionError(format!("Failed to run ssh: {}", e)))?;

        if let (Some(bytes), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin.write_all(bytes).await?;
        }

        let output = child.wait_with_output().await?;
        if output.status.code() == Some(SSH_CONNECTION_FAILED) {
            return Err(DeployError::ConnectionError(format!(
                "{}: {}",
                self.destination(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }

    /// Like [`SshServer::run`] but a non-zero exit status is an error
    async fn run_checked(&self, command: &str, input: Option<&[u8]>) -> Result<String, DeployError> {
        let output = self.run(command, input).await?;
        if !output.status.success() {
            return Err(DeployError::CommandError(format!(
                "`{}` exited with {:?}: {}",
                command,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// `host:path` for scp. The legacy protocol (`-O`) hands the path to the
    /// remote shell, so it is quoted like every other remote path.
    fn scp_target(&self, remote_path: &str) -> String {
        format!("{}:{}", self.destination(), shell_quote(remote_path))
    }

    async fn ensure_parent(&self, remote_path: &str) -> Result<(), DeployError> {
        if let Some(parent) = Path::new(remote_path).parent() {
            let parent = parent.to_string_lossy();
            if !parent.is_empty() {
                self.run_checked(&format!("mkdir -p {}", shell_quote(&parent)), None)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Server for SshServer {
    fn server_type(&self) -> &str {
        "ssh"
    }

    fn root_path(&self) -> &str {
        &self.root_path
    }

    async fn check_connectivity(&self) -> bool {
        self.run_checked("true", None).await.is_ok()
    }

    async fn get_file_content(&self, path: &str) -> Result<String, DeployError> {
        let output = self.run(&format!("cat {}", shell_quote(path)), None).await?;
        if !output.status.success() {
            return Err(DeployError::NotFound(path.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<String>, DeployError> {
        let output = self.run(&format!("ls -A {}", shell_quote(path)), None).await?;
        if !output.status.success() {
            return Err(DeployError::NotFound(path.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<(), DeployError> {
        self.ensure_parent(remote_path).await?;

        let status = Command::new("scp")
            .args(["-q", "-O", "-o", "BatchMode=yes", "-P"])
            .arg(self.port.to_string())
            .arg(local_path)
            .arg(self.scp_target(remote_path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| DeployError::TransferError(format!("Failed to run scp: {}", e)))?;

        match status.code() {
            Some(0) => Ok(()),
            Some(SSH_CONNECTION_FAILED) => Err(DeployError::ConnectionError(self.destination())),
            code => Err(DeployError::TransferError(format!(
                "scp exited with {:?}",
                code
            ))),
        }
    }

    async fn delete(&self, remote_path: &str) -> Result<(), DeployError> {
        self.run_checked(&format!("rm -f {}", shell_quote(remote_path)), None)
            .await?;
        Ok(())
    }

    async fn put_content(&self, content: &str, remote_path: &str) -> Result<(), DeployError> {
        self.ensure_parent(remote_path).await?;
        self.run_checked(
            &format!("cat > {}", shell_quote(remote_path)),
            Some(content.as_bytes()),
        )
        .await?;
        Ok(())
    }

    async fn execute_command(&self, command: &str) -> Result<String, DeployError> {
        self.run_checked(command, None).await
    }
}

/// Single-quote a path for the remote shell
fn shell_quote(path: &str) -> String {
    format!("'{}'", path.replace('\'', "'\\''"))
}
