use std::path::PathBuf;
use std::process::{Command, Stdio};

use keyprov_core::{AgentConfig, ProvisionError};

/// Session controller for gpg-agent. Every control command is a one-shot
/// connect-and-disconnect subprocess, not a persistent connection.
#[derive(Debug, Clone)]
pub struct GpgAgent {
    connect_path: String,
    homedir: Option<PathBuf>,
}

impl Default for GpgAgent {
    fn default() -> Self {
        Self {
            connect_path: "gpg-connect-agent".to_string(),
            homedir: None,
        }
    }
}

impl GpgAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_homedir(homedir: impl Into<PathBuf>) -> Self {
        Self {
            homedir: Some(homedir.into()),
            ..Self::default()
        }
    }

    /// The agent's home directory: explicit override, else `GNUPGHOME`,
    /// else `~/.gnupg`.
    pub fn home_dir(&self) -> PathBuf {
        if let Some(dir) = &self.homedir {
            return dir.clone();
        }
        if let Ok(value) = std::env::var("GNUPGHOME")
            && !value.is_empty()
        {
            return PathBuf::from(value);
        }
        match dirs::home_dir() {
            Some(home) => home.join(".gnupg"),
            None => PathBuf::from(".gnupg"),
        }
    }

    /// Write `config` into gpg-agent.conf and reload the running agent so
    /// it takes effect without a restart. Must complete before any
    /// passphrase is preset.
    pub fn configure(&self, config: &AgentConfig) -> Result<(), ProvisionError> {
        let home = self.home_dir();
        std::fs::create_dir_all(&home).map_err(|err| {
            ProvisionError::AgentConfig(format!("cannot create {}: {err}", home.display()))
        })?;
        let conf_path = home.join("gpg-agent.conf");
        crate::gpg::write_secret_file(&conf_path, config.render().as_bytes()).map_err(|err| {
            ProvisionError::AgentConfig(format!("cannot write {}: {err}", conf_path.display()))
        })?;
        self.command("RELOADAGENT")?;
        Ok(())
    }

    /// Seed the agent's passphrase cache for one keygrip and return the
    /// agent's KEYINFO reply for it. The `-1` TTL tells the agent not to
    /// expire the entry on its own schedule.
    pub fn preset_passphrase(
        &self,
        keygrip: &str,
        passphrase: &str,
    ) -> Result<String, ProvisionError> {
        let hex_passphrase = hex::encode(passphrase.as_bytes());
        self.command(&format!("PRESET_PASSPHRASE {keygrip} -1 {hex_passphrase}"))
            .map_err(as_preset_error)?;
        self.command(&format!("KEYINFO {keygrip}"))
            .map_err(as_preset_error)
    }

    pub fn kill(&self) -> Result<(), ProvisionError> {
        self.command("KILLAGENT").map(|_| ())
    }

    fn command(&self, command: &str) -> Result<String, ProvisionError> {
        let mut cmd = Command::new(&self.connect_path);
        if let Some(homedir) = &self.homedir {
            cmd.arg("--homedir").arg(homedir);
        }
        cmd.arg(command)
            .arg("/bye")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = cmd.output().map_err(|err| {
            ProvisionError::Gpg(format!("failed to spawn {}: {err}", self.connect_path))
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProvisionError::AgentProtocol(format!(
                "{} exited with {}: {}",
                self.connect_path,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        if let Some(line) = find_err_line(&stdout) {
            return Err(ProvisionError::AgentProtocol(line.to_string()));
        }
        Ok(stdout.trim().to_string())
    }
}

fn as_preset_error(err: ProvisionError) -> ProvisionError {
    match err {
        ProvisionError::AgentProtocol(msg) => ProvisionError::PresetPassphrase(msg),
        other => other,
    }
}

/// A reply is an error iff any line starts with the literal token `ERR`;
/// that line is the error detail.
fn find_err_line(reply: &str) -> Option<&str> {
    reply
        .lines()
        .map(str::trim_end)
        .find(|line| line.starts_with("ERR"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn err_line_detection() {
        assert_eq!(find_err_line("OK\n"), None);
        assert_eq!(
            find_err_line("S KEYINFO 3E2D D - - -\nOK\n"),
            None
        );
        assert_eq!(
            find_err_line("ERR 67108881 No such key <GPG Agent>\n"),
            Some("ERR 67108881 No such key <GPG Agent>")
        );
        assert_eq!(
            find_err_line("OK\nERR 67109139 Unknown IPC command <GPG Agent>\n"),
            Some("ERR 67109139 Unknown IPC command <GPG Agent>")
        );
    }

    #[test]
    fn preset_error_remapping() {
        let err = as_preset_error(ProvisionError::AgentProtocol("ERR 1".into()));
        assert!(matches!(err, ProvisionError::PresetPassphrase(_)));

        let err = as_preset_error(ProvisionError::Gpg("spawn failed".into()));
        assert!(matches!(err, ProvisionError::Gpg(_)));
    }

    #[test]
    fn passphrase_hex_encoding() {
        assert_eq!(hex::encode("with space".as_bytes()), "77697468207370616365");
        assert_eq!(hex::encode("p\u{e4}ss".as_bytes()), "70c3a47373");
    }

    #[test]
    fn home_dir_prefers_override() {
        let agent = GpgAgent::with_homedir("/tmp/keyprov-home");
        assert_eq!(agent.home_dir(), PathBuf::from("/tmp/keyprov-home"));
    }
}
