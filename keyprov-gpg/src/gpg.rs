use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use keyprov_core::{DeletionStage, ProvisionError, TrustLevel};

#[derive(Debug, Clone)]
pub struct GpgConfig {
    pub gpg_path: String,
    pub gpgconf_path: String,
    /// Keyring to operate on. `None` uses gpg's own default; tests point
    /// this at a disposable directory instead of the invoking user's.
    pub homedir: Option<PathBuf>,
}

impl Default for GpgConfig {
    fn default() -> Self {
        Self {
            gpg_path: "gpg".to_string(),
            gpgconf_path: "gpgconf".to_string(),
            homedir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpgVersion {
    pub gnupg: String,
    pub libgcrypt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpgDirs {
    pub libdir: String,
    pub libexecdir: String,
    pub datadir: String,
    pub homedir: String,
}

/// Handle on a gpg installation and one keyring within it.
#[derive(Debug, Clone)]
pub struct Gpg {
    config: GpgConfig,
}

impl Gpg {
    pub fn new(config: GpgConfig) -> Self {
        Self { config }
    }

    pub fn with_homedir(homedir: impl Into<PathBuf>) -> Self {
        Self::new(GpgConfig {
            homedir: Some(homedir.into()),
            ..GpgConfig::default()
        })
    }

    pub fn config(&self) -> &GpgConfig {
        &self.config
    }

    fn run(&self, args: &[&str], input: Option<&[u8]>) -> Result<CommandOutput, ProvisionError> {
        self.run_program(&self.config.gpg_path, args, input)
    }

    fn run_program(
        &self,
        program: &str,
        args: &[&str],
        input: Option<&[u8]>,
    ) -> Result<CommandOutput, ProvisionError> {
        let mut cmd = Command::new(program);
        if let Some(homedir) = &self.config.homedir {
            cmd.arg("--homedir").arg(homedir);
        }
        cmd.args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|err| ProvisionError::Gpg(format!("failed to spawn {program}: {err}")))?;

        if let Some(bytes) = input
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin
                .write_all(bytes)
                .map_err(|err| ProvisionError::Io(format!("{program} stdin write failed: {err}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|err| ProvisionError::Gpg(format!("{program} failed: {err}")))?;

        Ok(CommandOutput {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    pub fn version(&self) -> Result<GpgVersion, ProvisionError> {
        let output = self.run(&["--version"], None)?;
        if !output.status.success() {
            return Err(ProvisionError::Gpg(output.stderr_string()));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let mut version = GpgVersion::default();
        for line in text.lines() {
            if let Some(rest) = line.strip_prefix("gpg (GnuPG) ") {
                version.gnupg = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("gpg (GnuPG/MacGPG2) ") {
                version.gnupg = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("libgcrypt ") {
                version.libgcrypt = rest.trim().to_string();
            }
        }
        Ok(version)
    }

    pub fn dirs(&self) -> Result<GpgDirs, ProvisionError> {
        let output = self.run_program(&self.config.gpgconf_path, &["--list-dirs"], None)?;
        if !output.status.success() {
            return Err(ProvisionError::Gpg(output.stderr_string()));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let mut dirs = GpgDirs::default();
        for line in text.lines() {
            if let Some(rest) = line.strip_prefix("libdir:") {
                dirs.libdir = decode_dir_value(rest);
            } else if let Some(rest) = line.strip_prefix("libexecdir:") {
                dirs.libexecdir = decode_dir_value(rest);
            } else if let Some(rest) = line.strip_prefix("datadir:") {
                dirs.datadir = decode_dir_value(rest);
            } else if let Some(rest) = line.strip_prefix("homedir:") {
                dirs.homedir = decode_dir_value(rest);
            }
        }
        Ok(dirs)
    }

    /// Import a private key into the keyring. The key material only ever
    /// touches disk as a 0600 file inside a process-unique temp directory
    /// that is removed on every exit path.
    pub fn import_key(&self, blob: &str) -> Result<String, ProvisionError> {
        let armored = crate::openpgp::normalize_armored(blob)?;

        let dir = tempfile::Builder::new()
            .prefix("keyprov-")
            .tempdir()
            .map_err(|err| ProvisionError::Io(format!("temp dir error: {err}")))?;
        let key_path = dir.path().join("key.asc");
        write_secret_file(&key_path, armored.as_bytes())
            .map_err(|err| ProvisionError::Io(format!("temp write error: {err}")))?;
        let key_arg = key_path.to_string_lossy().to_string();

        let output = self.run(&["--import", "--batch", "--yes", &key_arg], None)?;
        if !output.status.success() {
            return Err(ProvisionError::Import {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: output.stderr_string(),
            });
        }

        // gpg reports the import summary on stderr.
        let stderr = output.stderr_string();
        if !stderr.is_empty() {
            Ok(stderr)
        } else {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        }
    }

    /// All keygrips recorded for a fingerprint, primary key grip first,
    /// then subkeys in gpg's own listing order.
    pub fn keygrips(&self, fingerprint: &str) -> Result<Vec<String>, ProvisionError> {
        let listing = self.list_secret_keys(fingerprint)?;
        let grips = parse_keygrips(&listing, fingerprint);
        if grips.is_empty() {
            return Err(ProvisionError::KeygripNotFound(fingerprint.to_string()));
        }
        Ok(grips)
    }

    /// The keygrip of the exact key (primary or subkey) whose fingerprint
    /// is given, not the first grip in the listing.
    pub fn keygrip(&self, fingerprint: &str) -> Result<String, ProvisionError> {
        let listing = self.list_secret_keys(fingerprint)?;
        parse_keygrip(&listing, fingerprint)
            .ok_or_else(|| ProvisionError::KeygripNotFound(fingerprint.to_string()))
    }

    fn list_secret_keys(&self, fingerprint: &str) -> Result<String, ProvisionError> {
        let output = self.run(
            &[
                "--batch",
                "--with-colons",
                "--with-keygrip",
                "--list-secret-keys",
                fingerprint,
            ],
            None,
        )?;
        // gpg exits non-zero when the fingerprint is not in the keyring.
        if !output.status.success() {
            return Err(ProvisionError::KeygripNotFound(fingerprint.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Delete secret then public key material. gpg refuses to delete a
    /// public key while its secret counterpart exists, hence the order.
    pub fn delete_key(&self, fingerprint: &str) -> Result<(), ProvisionError> {
        self.delete_stage(
            DeletionStage::Secret,
            &["--batch", "--yes", "--delete-secret-keys", fingerprint],
        )?;
        self.delete_stage(
            DeletionStage::Public,
            &["--batch", "--yes", "--delete-keys", fingerprint],
        )
    }

    fn delete_stage(&self, stage: DeletionStage, args: &[&str]) -> Result<(), ProvisionError> {
        let output = self.run(args, None)?;
        if !output.status.success() {
            return Err(ProvisionError::KeyDeletion {
                stage,
                stderr: output.stderr_string(),
            });
        }
        Ok(())
    }

    /// Set owner trust by scripting gpg's interactive key editor; the tool
    /// has no non-interactive trust-setting mode.
    pub fn set_trust_level(&self, key_id: &str, level: TrustLevel) -> Result<(), ProvisionError> {
        let script = format!("trust\n{}\ny\nquit\n", level.as_menu_code());
        let output = self.run(
            &[
                "--batch",
                "--no-tty",
                "--command-fd",
                "0",
                "--edit-key",
                key_id,
            ],
            Some(script.as_bytes()),
        )?;
        if !output.status.success() {
            return Err(ProvisionError::TrustAdjust(output.stderr_string()));
        }
        Ok(())
    }
}

struct CommandOutput {
    status: std::process::ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl CommandOutput {
    fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Extract every keygrip recorded under `fingerprint` from a
/// `--with-colons --with-keygrip --list-secret-keys` listing.
///
/// The `fpr:` record matching the fingerprint opens the capture window and
/// every following `grp:` line yields one grip. Subkey `fpr:` records in
/// the same key block leave the window open; a different key's block (a
/// new `sec:` record whose own `fpr:` does not match) closes it.
pub fn parse_keygrips(listing: &str, fingerprint: &str) -> Vec<String> {
    let mut grips = Vec::new();
    let mut in_block = false;
    let mut at_primary = false;
    for line in listing.lines() {
        if line.starts_with("sec:") {
            in_block = false;
            at_primary = true;
        } else if line.starts_with("ssb:") {
            at_primary = false;
        } else if let Some(rest) = line.strip_prefix("fpr:") {
            if strip_colons(rest) == fingerprint {
                in_block = true;
            } else if at_primary {
                in_block = false;
            }
            at_primary = false;
        } else if let Some(rest) = line.strip_prefix("grp:")
            && in_block
        {
            grips.push(strip_colons(rest));
        }
    }
    grips
}

/// Resolve the single grip scoped to the exact `fpr:` record given, so a
/// subkey fingerprint yields that subkey's grip.
pub fn parse_keygrip(listing: &str, fingerprint: &str) -> Option<String> {
    let mut found = false;
    for line in listing.lines() {
        if let Some(rest) = line.strip_prefix("fpr:") {
            found = strip_colons(rest) == fingerprint;
        } else if let Some(rest) = line.strip_prefix("grp:")
            && found
        {
            return Some(strip_colons(rest));
        }
    }
    None
}

fn strip_colons(field: &str) -> String {
    field.chars().filter(|c| *c != ':').collect()
}

fn decode_dir_value(raw: &str) -> String {
    raw.trim().replace("%3a", ":")
}

pub(crate) fn write_secret_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::fs::OpenOptions;

    #[cfg(unix)]
    use std::os::unix::fs::OpenOptionsExt;

    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_values_decode_escaped_colons() {
        assert_eq!(decode_dir_value("C%3a/gnupg"), "C:/gnupg");
        assert_eq!(decode_dir_value(" /usr/lib/gnupg"), "/usr/lib/gnupg");
    }

    #[test]
    fn colon_stripping() {
        assert_eq!(strip_colons("::::::::ABCDEF:"), "ABCDEF");
        assert_eq!(strip_colons("ABCDEF"), "ABCDEF");
    }
}
