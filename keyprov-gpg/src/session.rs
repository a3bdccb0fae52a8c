use keyprov_core::{
    AgentConfig, PrivateKeyIdentity, ProvisionError, SessionHandoff, TrustLevel,
};
use tracing::{debug, info, warn};

use crate::agent::GpgAgent;
use crate::gpg::Gpg;
use crate::openpgp;

#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// Armored or base64-encoded private key material.
    pub key: String,
    pub passphrase: Option<String>,
    /// Explicit fingerprint override: scopes passphrase presetting to the
    /// one key (usually a subkey) it names instead of every grip of the
    /// primary fingerprint.
    pub fingerprint: Option<String>,
    pub trust_level: Option<TrustLevel>,
    pub agent_config: AgentConfig,
}

impl Default for ProvisionRequest {
    fn default() -> Self {
        Self {
            key: String::new(),
            passphrase: None,
            fingerprint: None,
            trust_level: None,
            agent_config: AgentConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub identity: PrivateKeyIdentity,
    /// The fingerprint the run operated on: the override when one was
    /// given, else the identity's primary fingerprint.
    pub fingerprint: String,
    pub import_output: String,
    pub handoff: SessionHandoff,
}

/// Setup phase: read identity, import, preset passphrases, optionally set
/// trust. Errors abort immediately; the import temp file is released on
/// every path regardless.
pub fn provision(
    gpg: &Gpg,
    agent: &GpgAgent,
    request: &ProvisionRequest,
) -> Result<ProvisionReport, ProvisionError> {
    let identity = openpgp::read_identity(&request.key)?;
    info!(
        fingerprint = %identity.fingerprint,
        key_id = %identity.key_id,
        "read private key"
    );

    let fingerprint = request
        .fingerprint
        .clone()
        .unwrap_or_else(|| identity.fingerprint.clone());

    let import_output = gpg.import_key(&request.key)?;
    debug!(%import_output, "imported private key");

    if let Some(passphrase) = &request.passphrase {
        info!("configuring gpg agent");
        agent.configure(&request.agent_config)?;

        // One coherent listing call resolves all grips; with an explicit
        // fingerprint override only that key's grip is preset.
        if request.fingerprint.is_some() {
            let keygrip = gpg.keygrip(&fingerprint)?;
            info!(%keygrip, %fingerprint, "presetting passphrase");
            let status = agent.preset_passphrase(&keygrip, passphrase)?;
            debug!(%status, "agent cache status");
        } else {
            for keygrip in gpg.keygrips(&fingerprint)? {
                info!(%keygrip, "presetting passphrase");
                let status = agent.preset_passphrase(&keygrip, passphrase)?;
                debug!(%status, "agent cache status");
            }
        }
    }

    if let Some(level) = request.trust_level {
        gpg.set_trust_level(&identity.key_id, level)?;
        info!(
            key_id = %identity.key_id,
            level = level.as_menu_code(),
            "trust level set"
        );
    }

    let handoff = SessionHandoff {
        fingerprint: identity.fingerprint.clone(),
        key_id: identity.key_id.clone(),
    };

    Ok(ProvisionReport {
        identity,
        fingerprint,
        import_output,
        handoff,
    })
}

/// Cleanup phase, driven by the handoff the setup phase persisted. Runs
/// after the protected operation already completed, so failures here are
/// warnings, never job failures.
pub fn teardown(gpg: &Gpg, agent: &GpgAgent, handoff: &SessionHandoff) {
    info!(fingerprint = %handoff.fingerprint, "removing key");
    if let Err(err) = gpg.delete_key(&handoff.fingerprint) {
        warn!("key removal failed: {err}");
    }

    info!("killing gpg agent");
    if let Err(err) = agent.kill() {
        warn!("agent shutdown failed: {err}");
    }
}
