//! Unlock handshakes.
//!
//! Both firmware families hand out a 16-byte seed and expect
//! `SHA-256(family_key || seed)[..16]` back before they serve values.

use tracing::{debug, info, warn};

use super::dispatcher::Dispatcher;
use crate::crypto::{KeySchedule, LEGACY_ACCESS_KEY, LORAX_ACCESS_KEY};
use crate::error::{Error, Result};
use crate::protocol::{decode_limits, Limits, Opcode};
use crate::transport::gatt::legacy;

/// Legacy unlock: read the seed characteristic, write the key back to it.
pub async fn unlock_legacy(dispatcher: &Dispatcher) -> Result<()> {
    let seed = dispatcher
        .read_characteristic(legacy::ACCESS_SEED_KEY)
        .await
        .map_err(|e| Error::HandshakeFailed(format!("seed read failed: {e}")))?;
    let key = KeySchedule::access_key_from_slice(&LEGACY_ACCESS_KEY, &seed)?;

    dispatcher
        .write_characteristic(legacy::ACCESS_SEED_KEY, &key, true)
        .await
        .map_err(|e| Error::HandshakeFailed(format!("key write failed: {e}")))?;

    info!("Legacy access unlocked");
    Ok(())
}

/// Lorax unlock: `GET_LIMITS`, `GET_ACCESS_SEED`, then `UNLOCK_ACCESS`.
pub async fn unlock_lorax(dispatcher: &Dispatcher) -> Result<Limits> {
    let limits = match dispatcher.request_ok(Opcode::GetLimits, Vec::new(), None).await {
        Ok(data) => decode_limits(&data)?,
        Err(Error::Protocol(e)) => {
            warn!("GET_LIMITS failed ({}), using defaults", e);
            Limits::default()
        }
        Err(e) => return Err(e),
    };
    dispatcher.set_max_payload(u16::from(limits.max_payload));
    debug!(
        "Limits: payload={} files={} commands={}",
        limits.max_payload, limits.max_files, limits.max_commands
    );

    let seed = dispatcher
        .request_ok(Opcode::GetAccessSeed, Vec::new(), None)
        .await
        .map_err(|e| Error::HandshakeFailed(format!("seed request failed: {e}")))?;
    let key = KeySchedule::access_key_from_slice(&LORAX_ACCESS_KEY, &seed)?;

    let reply = dispatcher
        .request(Opcode::UnlockAccess, key.to_vec(), None)
        .await?;
    if reply.error {
        return Err(Error::HandshakeFailed("device rejected access key".into()));
    }

    info!("Lorax access unlocked");
    Ok(limits)
}
