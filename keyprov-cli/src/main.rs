use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keyprov_core::{SessionHandoff, TrustLevel};
use keyprov_gpg::gpg::GpgConfig;
use keyprov_gpg::{Gpg, GpgAgent, ProvisionRequest, provision, teardown};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(
    name = "keyprov",
    version,
    about = "Provision an ephemeral GnuPG signing identity for a CI job"
)]
struct Cli {
    /// Keyring directory to operate on instead of gpg's default.
    #[arg(long, global = true, value_name = "DIR")]
    homedir: Option<PathBuf>,

    /// Where the setup phase hands its session state to the cleanup phase.
    #[arg(long, global = true, value_name = "FILE", default_value = "keyprov-state.json")]
    state_file: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import the key, preset passphrases, record the session state.
    Setup {
        /// Armored or base64-encoded private key; stdin when omitted.
        #[arg(long, value_name = "FILE")]
        key_file: Option<PathBuf>,
        /// Passphrase to preset into the agent cache. File-based on
        /// purpose: argv is visible to other processes.
        #[arg(long, value_name = "FILE")]
        passphrase_file: Option<PathBuf>,
        /// Preset only the key with this fingerprint instead of every
        /// subkey of the imported key.
        #[arg(long)]
        fingerprint: Option<String>,
        /// Owner trust to assign: 1-5 or unknown/never/marginal/full/ultimate.
        #[arg(long, value_parser = parse_trust_level)]
        trust_level: Option<TrustLevel>,
    },
    /// Remove the provisioned key and terminate the agent.
    Cleanup,
    /// Report the GnuPG installation's version and directories.
    Info,
}

fn main() -> Result<()> {
    init_tracing();
    run(Cli::parse())
}

fn run(cli: Cli) -> Result<()> {
    let gpg = Gpg::new(GpgConfig {
        homedir: cli.homedir.clone(),
        ..GpgConfig::default()
    });
    let agent = match &cli.homedir {
        Some(dir) => GpgAgent::with_homedir(dir),
        None => GpgAgent::new(),
    };

    match cli.cmd {
        Command::Setup {
            key_file,
            passphrase_file,
            fingerprint,
            trust_level,
        } => {
            let key = read_key_input(key_file.as_deref())?;
            let passphrase = passphrase_file
                .as_deref()
                .map(read_passphrase_file)
                .transpose()?;

            let request = ProvisionRequest {
                key,
                passphrase,
                fingerprint,
                trust_level,
                ..ProvisionRequest::default()
            };
            let report = provision(&gpg, &agent, &request)?;

            save_state(&cli.state_file, &report.handoff)?;
            info!(state_file = %cli.state_file.display(), "session state recorded");

            println!("fingerprint={}", report.fingerprint);
            println!("keyid={}", report.identity.key_id);
            println!("name={}", report.identity.primary_uid.name);
            println!("email={}", report.identity.primary_uid.email);
            Ok(())
        }
        Command::Cleanup => {
            match load_state(&cli.state_file)? {
                Some(handoff) => {
                    teardown(&gpg, &agent, &handoff);
                    std::fs::remove_file(&cli.state_file).with_context(|| {
                        format!("cannot remove state file {}", cli.state_file.display())
                    })?;
                }
                None => {
                    debug!("no session state found; skipping cleanup");
                }
            }
            Ok(())
        }
        Command::Info => {
            let version = gpg.version()?;
            let dirs = gpg.dirs()?;
            println!("GnuPG version : {} (libgcrypt {})", version.gnupg, version.libgcrypt);
            println!("Libdir        : {}", dirs.libdir);
            println!("Libexecdir    : {}", dirs.libexecdir);
            println!("Datadir       : {}", dirs.datadir);
            println!("Homedir       : {}", dirs.homedir);
            Ok(())
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_trust_level(value: &str) -> Result<TrustLevel, String> {
    value.parse()
}

fn read_key_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read key file {}", path.display())),
        None => {
            let mut key = String::new();
            std::io::stdin()
                .read_to_string(&mut key)
                .context("cannot read key from stdin")?;
            Ok(key)
        }
    }
}

fn read_passphrase_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("cannot read passphrase file {}", path.display()))?;
    let text = String::from_utf8(bytes).context("passphrase file must be valid UTF-8")?;
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}

fn save_state(path: &Path, handoff: &SessionHandoff) -> Result<()> {
    let json = serde_json::to_vec_pretty(handoff).context("serialize session state")?;
    write_file_secure(path, &json)
        .with_context(|| format!("cannot write state file {}", path.display()))
}

fn load_state(path: &Path) -> Result<Option<SessionHandoff>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read state file {}", path.display()))?;
    let handoff = serde_json::from_str(&text)
        .with_context(|| format!("state file {} is not valid", path.display()))?;
    Ok(Some(handoff))
}

fn write_file_secure(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;

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
