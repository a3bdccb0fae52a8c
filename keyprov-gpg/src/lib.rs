pub mod agent;
pub mod gpg;
pub mod openpgp;
pub mod session;

pub use agent::GpgAgent;
pub use gpg::{Gpg, GpgConfig, GpgDirs, GpgVersion, parse_keygrip, parse_keygrips};
pub use openpgp::{is_armored, normalize_armored, read_identity};
pub use session::{ProvisionReport, ProvisionRequest, provision, teardown};
