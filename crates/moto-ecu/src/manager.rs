//! Discovery and lifecycle of ECUs on the bus

use std::sync::Arc;

use moto_link::broadcaster::{Broadcaster, Subscription};
use moto_link::CanTransport;
use moto_uds::service::service_id;
use moto_uds::session::tester_present_message;
use moto_uds::{Body, Message, UdsSession};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dtc::{Dtc, DtcDictionary};
use crate::ecu::{Ecu, EcuIdentification};
use crate::error::EcuError;
use crate::profile::EcuProfile;

/// Lifecycle notifications, replacing ad-hoc callback lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcuEvent {
    ScanCompleted { labels: Vec<String> },
    Connected { label: String },
    Disconnected,
}

#[derive(Clone)]
struct DiscoveredEcu {
    profile: EcuProfile,
    identification: EcuIdentification,
}

/// Scans for known ECU families and owns the active connection.
///
/// Collaborators are injected explicitly: the transport, the profiles to
/// probe for and the DTC dictionary all arrive through the constructor.
pub struct EcuManager {
    transport: Arc<dyn CanTransport>,
    profiles: Vec<EcuProfile>,
    dictionary: Arc<dyn DtcDictionary>,
    discovered: RwLock<Vec<DiscoveredEcu>>,
    active: RwLock<Option<Arc<Ecu>>>,
    events: Broadcaster<EcuEvent>,
    cancel: CancellationToken,
}

impl EcuManager {
    pub fn new(
        transport: Arc<dyn CanTransport>,
        profiles: Vec<EcuProfile>,
        dictionary: Arc<dyn DtcDictionary>,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            transport,
            profiles,
            dictionary,
            discovered: RwLock::new(Vec::new()),
            active: RwLock::new(None),
            events: Broadcaster::new("ecu-event"),
            cancel: parent.child_token(),
        }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe_events(&self) -> Subscription<EcuEvent> {
        self.events.subscribe()
    }

    /// Probe the bus for every configured family.
    ///
    /// Each probe runs over a provisional session that is torn down
    /// before the next one; a compatible ECU ends up in the discovered
    /// list as a fresh record, ready to be connected.
    pub async fn scan(&self, cancel: &CancellationToken) -> Result<Vec<String>, EcuError> {
        info!("scanning for ECUs");
        let mut found = Vec::new();

        for profile in &self.profiles {
            debug!(family = %profile.name, "probing");
            match self.probe_profile(cancel, profile).await {
                Ok(identification) => {
                    info!(ecu = %identification.label(), "compatible ECU found");
                    found.push(DiscoveredEcu {
                        profile: profile.clone(),
                        identification,
                    });
                }
                Err(e) if e.is_cancelled() => return Err(EcuError::Cancelled),
                Err(e) => {
                    warn!(family = %profile.name, error = %e, "no compatible ECU for family");
                }
            }
        }

        let labels: Vec<String> = found.iter().map(|e| e.identification.label()).collect();
        if labels.is_empty() {
            info!("didn't find any available ECUs");
        } else {
            info!(ecus = ?labels, "scan complete");
        }
        *self.discovered.write() = found;
        self.events.broadcast(EcuEvent::ScanCompleted {
            labels: labels.clone(),
        });
        Ok(labels)
    }

    async fn probe_profile(
        &self,
        cancel: &CancellationToken,
        profile: &EcuProfile,
    ) -> Result<EcuIdentification, EcuError> {
        let session = UdsSession::new(self.transport.clone(), profile.tester_id, &self.cancel);
        session.start();
        let result = self.identify(cancel, &session, profile).await;
        // the provisional session never outlives the probe
        session.shutdown().await;
        result
    }

    async fn identify(
        &self,
        cancel: &CancellationToken,
        session: &UdsSession,
        profile: &EcuProfile,
    ) -> Result<EcuIdentification, EcuError> {
        // make sure something answers before interrogating it
        session
            .send(cancel, &tester_present_message(profile.tester_id))
            .await?;
        session
            .read_matching(cancel, Some(service_id::TESTER_PRESENT), None)
            .await?;
        debug!("communication established");

        let subs = &profile.ident_subfunctions;

        let hardware_id = self
            .read_identification(cancel, session, profile, subs.hardware_id)
            .await?;
        if !profile.compatible_hardware_ids.contains(&hardware_id) {
            return Err(EcuError::Incompatible {
                field: "hardware id",
                value: hardware_id,
            });
        }

        let software_id = self
            .read_identification(cancel, session, profile, subs.software_id)
            .await?;
        if !profile.compatible_software_ids.contains(&software_id) {
            return Err(EcuError::Incompatible {
                field: "software id",
                value: software_id,
            });
        }

        let model = self
            .read_identification(cancel, session, profile, subs.model)
            .await?;
        if !profile.compatible_models.contains(&model) {
            return Err(EcuError::Incompatible {
                field: "model",
                value: model,
            });
        }

        let vin = self
            .read_identification(cancel, session, profile, subs.vin)
            .await?;
        let manufacturer = self
            .read_identification(cancel, session, profile, subs.manufacturer)
            .await?;

        Ok(EcuIdentification {
            hardware_id,
            software_id,
            manufacturer,
            model,
            vin,
        })
    }

    async fn read_identification(
        &self,
        cancel: &CancellationToken,
        session: &UdsSession,
        profile: &EcuProfile,
        subfunction: u8,
    ) -> Result<String, EcuError> {
        let request = Message::request_with_subfunction(
            profile.tester_id,
            profile.read_identification_service,
            subfunction,
        );
        session.send(cancel, &request).await?;
        let response = session
            .read_matching(
                cancel,
                Some(profile.read_identification_service),
                Some(subfunction),
            )
            .await?;
        match &response.body {
            Body::Negative { nrc, .. } => Err(EcuError::NegativeResponse {
                service_id: response.service_id,
                nrc: *nrc,
            }),
            _ => Ok(response.ascii_payload()),
        }
    }

    /// Labels of the ECUs found by the last scan.
    pub fn discovered(&self) -> Vec<String> {
        self.discovered
            .read()
            .iter()
            .map(|e| e.identification.label())
            .collect()
    }

    /// Connect to a discovered ECU by its label, starting a fresh
    /// session with its own broadcaster and loops.
    pub async fn connect(&self, label: &str) -> Result<(), EcuError> {
        let entry = self
            .discovered
            .read()
            .iter()
            .find(|e| e.identification.label() == label)
            .cloned()
            .ok_or_else(|| EcuError::UnknownEcu(label.to_string()))?;

        // only one active connection at a time
        self.disconnect().await;

        let ecu = Arc::new(Ecu::new(
            entry.profile,
            entry.identification,
            self.transport.clone(),
            &self.cancel,
        ));
        ecu.start();
        *self.active.write() = Some(ecu.clone());
        self.events.broadcast(EcuEvent::Connected { label: ecu.label() });
        info!(ecu = %ecu.label(), "connected");
        Ok(())
    }

    /// Cancel the active ECU's scope and tear its session down.
    pub async fn disconnect(&self) {
        let Some(ecu) = self.active.write().take() else {
            return;
        };
        ecu.shutdown().await;
        self.events.broadcast(EcuEvent::Disconnected);
        info!("disconnected");
    }

    /// The connected ECU, if any.
    pub fn active(&self) -> Option<Arc<Ecu>> {
        self.active.read().clone()
    }

    pub async fn read_dtcs(&self, cancel: &CancellationToken) -> Result<Vec<Dtc>, EcuError> {
        let ecu = self.active().ok_or(EcuError::NotConnected)?;
        ecu.read_dtcs(cancel, self.dictionary.as_ref()).await
    }

    pub async fn clear_dtcs(&self, cancel: &CancellationToken) -> Result<(), EcuError> {
        let ecu = self.active().ok_or(EcuError::NotConnected)?;
        ecu.clear_dtcs(cancel).await
    }

    pub async fn security_unlock(
        &self,
        cancel: &CancellationToken,
        level: u8,
    ) -> Result<(), EcuError> {
        let ecu = self.active().ok_or(EcuError::NotConnected)?;
        ecu.security_unlock(cancel, level).await
    }

    /// Disconnect and close the event stream. Idempotent.
    pub async fn shutdown(&self) {
        self.disconnect().await;
        self.cancel.cancel();
        self.events.cleanup();
    }
}

impl Drop for EcuManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
