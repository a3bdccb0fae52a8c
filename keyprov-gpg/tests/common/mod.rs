use std::path::Path;
use std::process::{Command, Stdio};

use tempfile::TempDir;

pub fn gpg_available() -> bool {
    program_available("gpg", "--version")
}

pub fn connect_agent_available() -> bool {
    program_available("gpg-connect-agent", "--version")
}

fn program_available(program: &str, arg: &str) -> bool {
    Command::new(program)
        .arg(arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// A disposable keyring directory; gpg wants it 0700.
pub fn temp_keyring() -> TempDir {
    let dir = tempfile::Builder::new()
        .prefix("keyring-test-")
        .tempdir()
        .expect("tempdir");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o700))
            .expect("chmod homedir");
    }
    dir
}

/// Generate an unprotected test key in `homedir` and return its armored
/// secret-key export.
pub fn generate_test_key(homedir: &Path, user_id: &str) -> String {
    run_gpg(
        homedir,
        &[
            "--batch",
            "--pinentry-mode",
            "loopback",
            "--passphrase",
            "",
            "--quick-generate-key",
            user_id,
            "default",
            "default",
            "never",
        ],
    );
    run_gpg(
        homedir,
        &[
            "--armor",
            "--pinentry-mode",
            "loopback",
            "--passphrase",
            "",
            "--export-secret-keys",
            user_id,
        ],
    )
}

pub fn kill_agent(homedir: &Path) {
    let _ = Command::new("gpg-connect-agent")
        .arg("--homedir")
        .arg(homedir)
        .arg("KILLAGENT")
        .arg("/bye")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

fn run_gpg(homedir: &Path, args: &[&str]) -> String {
    let output = Command::new("gpg")
        .arg("--homedir")
        .arg(homedir)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .expect("spawn gpg");
    if !output.status.success() {
        panic!(
            "gpg {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8(output.stdout).expect("gpg output utf8")
}
