//! A connected ECU: session ownership and diagnostic operations

use std::sync::Arc;

use moto_link::CanTransport;
use moto_uds::service::service_id;
use moto_uds::{Body, Message, UdsSession};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dtc::{parse_dtc_payload, Dtc, DtcDictionary};
use crate::error::EcuError;
use crate::profile::EcuProfile;
use crate::seedkey;

/// Identification strings collected during the scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EcuIdentification {
    pub hardware_id: String,
    pub software_id: String,
    pub manufacturer: String,
    pub model: String,
    pub vin: String,
}

impl EcuIdentification {
    /// Display label, unique enough to pick an ECU out of a scan result.
    pub fn label(&self) -> String {
        format!(
            "{} {} ECU: {}",
            self.manufacturer, self.model, self.hardware_id
        )
    }
}

/// An ECU with an established session.
pub struct Ecu {
    profile: EcuProfile,
    identification: EcuIdentification,
    session: UdsSession,
}

impl Ecu {
    pub(crate) fn new(
        profile: EcuProfile,
        identification: EcuIdentification,
        transport: Arc<dyn CanTransport>,
        parent: &CancellationToken,
    ) -> Self {
        let session = UdsSession::new(transport, profile.tester_id, parent);
        Self {
            profile,
            identification,
            session,
        }
    }

    pub(crate) fn start(&self) {
        self.session.start();
    }

    pub(crate) async fn shutdown(&self) {
        self.session.shutdown().await;
    }

    pub fn profile(&self) -> &EcuProfile {
        &self.profile
    }

    pub fn identification(&self) -> &EcuIdentification {
        &self.identification
    }

    pub fn label(&self) -> String {
        self.identification.label()
    }

    pub fn session(&self) -> &UdsSession {
        &self.session
    }

    /// Read the stored trouble codes.
    ///
    /// The response payload is scanned in two-byte groups; descriptions
    /// come from the dictionary, unknown codes pass through verbatim.
    pub async fn read_dtcs(
        &self,
        cancel: &CancellationToken,
        dictionary: &dyn DtcDictionary,
    ) -> Result<Vec<Dtc>, EcuError> {
        let service = self.profile.read_errors_service;
        let request = Message::request(self.profile.tester_id, service);
        self.session.send(cancel, &request).await?;

        let response = self.session.read_matching(cancel, Some(service), None).await?;
        match &response.body {
            Body::Negative { nrc, .. } => Err(EcuError::NegativeResponse {
                service_id: response.service_id,
                nrc: *nrc,
            }),
            _ => {
                let dtcs = parse_dtc_payload(response.payload(), dictionary);
                info!(count = dtcs.len(), "read trouble codes");
                Ok(dtcs)
            }
        }
    }

    /// Clear the stored trouble codes.
    pub async fn clear_dtcs(&self, cancel: &CancellationToken) -> Result<(), EcuError> {
        let service = self.profile.clear_errors_service;
        let request = Message::request(self.profile.tester_id, service);
        self.session.send(cancel, &request).await?;

        let response = self.session.read_matching(cancel, Some(service), None).await?;
        match &response.body {
            Body::Negative { nrc, .. } => Err(EcuError::NegativeResponse {
                service_id: response.service_id,
                nrc: *nrc,
            }),
            _ => {
                info!("cleared trouble codes");
                Ok(())
            }
        }
    }

    /// Unlock security access at the given level.
    ///
    /// Requests the seed on the level's odd subfunction, derives the key
    /// with the family's seed/key scheme and sends it back on the even
    /// subfunction. A zero seed means the level is already unlocked.
    pub async fn security_unlock(
        &self,
        cancel: &CancellationToken,
        level: u8,
    ) -> Result<(), EcuError> {
        let request_seed_sub = level
            .checked_mul(2)
            .and_then(|v| v.checked_sub(1))
            .ok_or(crate::KeygenError::InvalidLevel(level))?;
        let send_key_sub = request_seed_sub + 1;

        let request = Message::request_with_subfunction(
            self.profile.tester_id,
            service_id::SECURITY_ACCESS,
            request_seed_sub,
        );
        self.session.send(cancel, &request).await?;
        let response = self
            .session
            .read_matching(cancel, Some(service_id::SECURITY_ACCESS), Some(request_seed_sub))
            .await?;

        let seed = match &response.body {
            Body::Negative { nrc, .. } => {
                return Err(EcuError::NegativeResponse {
                    service_id: response.service_id,
                    nrc: *nrc,
                })
            }
            _ => {
                let payload = response.payload();
                if payload.len() < 2 {
                    return Err(EcuError::InvalidResponse(format!(
                        "seed of {} bytes, expected 2",
                        payload.len()
                    )));
                }
                [payload[0], payload[1]]
            }
        };

        if seed == [0x00, 0x00] {
            debug!(level, "zero seed, security already unlocked");
            return Ok(());
        }

        let key = seedkey::generate_key(seed, level)?;
        let key_message = Message {
            sender_id: self.profile.tester_id,
            service_id: service_id::SECURITY_ACCESS,
            body: Body::Request {
                subfunction: Some(send_key_sub),
                payload: key.to_vec(),
            },
        };
        self.session.send(cancel, &key_message).await?;
        let response = self
            .session
            .read_matching(cancel, Some(service_id::SECURITY_ACCESS), Some(send_key_sub))
            .await?;

        match &response.body {
            Body::Negative { nrc, .. } => Err(EcuError::NegativeResponse {
                service_id: response.service_id,
                nrc: *nrc,
            }),
            _ => {
                info!(level, "security access granted");
                Ok(())
            }
        }
    }
}
