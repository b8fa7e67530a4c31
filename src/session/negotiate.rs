//! Capability negotiation.
//!
//! Decides which firmware family the peer speaks from the services it
//! advertises, and triggers OS-level pairing on Lorax firmware by reading a
//! protected diagnostic characteristic.

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::transport::gatt::{legacy, lorax};
use crate::transport::GattTransport;
use crate::types::{Capabilities, Mode};

/// Connect the transport and inspect the peer.
pub async fn negotiate(transport: &dyn GattTransport) -> Result<Capabilities> {
    transport.connect().await.map_err(|e| match e {
        Error::ConnectFailed(_) => e,
        other => Error::ConnectFailed(other.to_string()),
    })?;

    let services = transport
        .services()
        .await
        .map_err(|e| Error::ConnectFailed(format!("service discovery failed: {e}")))?;
    debug!("Peer advertises {} services", services.len());

    let capabilities = if services.contains(&lorax::SERVICE) {
        let pup = services.contains(&lorax::PUP_SERVICE);
        let pairing_read = if pup {
            Some(lorax::PUP_DIAGNOSTIC)
        } else if services.contains(&lorax::OTA_SERVICE) {
            Some(lorax::OTA_DIAGNOSTIC)
        } else {
            None
        };

        if let Some(characteristic) = pairing_read {
            transport
                .read(characteristic)
                .await
                .map_err(|e| Error::ConnectFailed(format!("pairing failed: {e}")))?;
        }

        Capabilities {
            mode: Mode::Lorax,
            pup,
            services,
            limits: None,
        }
    } else if services.contains(&legacy::SERVICE) {
        if !services.contains(&legacy::MODEL_INFO_SERVICE) {
            return Err(Error::ConnectFailed(
                "legacy device is missing the model information service".into(),
            ));
        }
        Capabilities {
            mode: Mode::Legacy,
            pup: false,
            services,
            limits: None,
        }
    } else {
        return Err(Error::ConnectFailed("no supported service found".into()));
    };

    info!(
        "Negotiated {} mode over {}{}",
        capabilities.mode,
        transport.transport_type(),
        if capabilities.pup { " (pup)" } else { "" }
    );
    Ok(capabilities)
}
