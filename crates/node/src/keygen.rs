//! Generates a new raw 32-byte Ed25519 seed file, the format
//! [`coordinator_signer::Signer::load_from_file`] expects.

use std::path::Path;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

/// Writes a freshly generated signing key seed to `out`. Refuses to
/// overwrite an existing file so `keygen` never silently destroys key
/// material already in use.
pub fn generate(out: &Path) -> std::io::Result<()> {
    if out.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists; refusing to overwrite a signing key", out.display()),
        ));
    }
    let signing_key = SigningKey::generate(&mut OsRng);
    std::fs::write(out, signing_key.to_bytes())?;
    tracing::info!(path = %out.display(), "keygen: wrote a new signing key seed");
    Ok(())
}
