//! UDS message model and raw-byte codec

use std::fmt;

use crate::nrc::NegativeResponseCode;
use crate::{service, subfunction};

/// CAN id the tester transmits on.
pub const TESTER_ID: u16 = 0x7E0;
/// CAN id the ECU answers on.
pub const ECU_ID: u16 = 0x7E8;

/// First byte of every negative response.
pub const NEGATIVE_RESPONSE_BYTE: u8 = 0x7F;
/// Added to the service id in positive responses.
pub const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;

/// A full UDS message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// CAN id of the sender.
    pub sender_id: u16,
    /// UDS service id. Any byte value is accepted; known ids get a label
    /// in log output.
    pub service_id: u8,
    pub body: Body,
}

/// Direction and polarity of a message.
///
/// A negative response carries an NRC and never a subfunction; a request
/// or positive response carries an optional subfunction. Modelling this
/// as a sum makes the illegal combinations unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Request {
        subfunction: Option<u8>,
        payload: Vec<u8>,
    },
    Positive {
        subfunction: Option<u8>,
        payload: Vec<u8>,
    },
    Negative {
        nrc: NegativeResponseCode,
        payload: Vec<u8>,
    },
}

impl Message {
    /// A request with no subfunction and no payload.
    pub fn request(sender_id: u16, service_id: u8) -> Self {
        Self {
            sender_id,
            service_id,
            body: Body::Request {
                subfunction: None,
                payload: Vec::new(),
            },
        }
    }

    /// A request carrying a subfunction.
    pub fn request_with_subfunction(sender_id: u16, service_id: u8, subfunction: u8) -> Self {
        Self {
            sender_id,
            service_id,
            body: Body::Request {
                subfunction: Some(subfunction),
                payload: Vec::new(),
            },
        }
    }

    pub fn is_response(&self) -> bool {
        !matches!(self.body, Body::Request { .. })
    }

    /// Polarity of a response; `None` for requests.
    pub fn is_positive(&self) -> Option<bool> {
        match self.body {
            Body::Request { .. } => None,
            Body::Positive { .. } => Some(true),
            Body::Negative { .. } => Some(false),
        }
    }

    pub fn subfunction(&self) -> Option<u8> {
        match self.body {
            Body::Request { subfunction, .. } | Body::Positive { subfunction, .. } => subfunction,
            Body::Negative { .. } => None,
        }
    }

    pub fn nrc(&self) -> Option<NegativeResponseCode> {
        match self.body {
            Body::Negative { nrc, .. } => Some(nrc),
            _ => None,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match &self.body {
            Body::Request { payload, .. }
            | Body::Positive { payload, .. }
            | Body::Negative { payload, .. } => payload,
        }
    }

    /// Printable characters of the payload, as used by the identification
    /// strings the ECU returns.
    pub fn ascii_payload(&self) -> String {
        self.payload()
            .iter()
            .filter(|b| b.is_ascii_graphic() || **b == b' ')
            .map(|&b| b as char)
            .collect()
    }

    /// Encode into the on-wire byte sequence carried by ISO-TP.
    pub fn to_raw(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(3 + self.payload().len());
        match &self.body {
            Body::Request {
                subfunction,
                payload,
            } => {
                raw.push(self.service_id);
                if let Some(sub) = subfunction {
                    raw.push(*sub);
                }
                raw.extend_from_slice(payload);
            }
            Body::Positive {
                subfunction,
                payload,
            } => {
                raw.push(self.service_id.wrapping_add(POSITIVE_RESPONSE_OFFSET));
                if let Some(sub) = subfunction {
                    raw.push(*sub);
                }
                raw.extend_from_slice(payload);
            }
            Body::Negative { nrc, payload } => {
                raw.push(NEGATIVE_RESPONSE_BYTE);
                raw.push(self.service_id);
                raw.push((*nrc).into());
                raw.extend_from_slice(payload);
            }
        }
        raw
    }

    /// Decode a raw byte sequence.
    ///
    /// Returns `None` for an empty buffer or a negative response too short
    /// to carry its NRC.
    pub fn from_raw(sender_id: u16, raw: &[u8], is_response: bool) -> Option<Self> {
        let first = *raw.first()?;

        if !is_response {
            return Some(Self {
                sender_id,
                service_id: first,
                body: Body::Request {
                    subfunction: raw.get(1).copied(),
                    payload: raw.get(2..).unwrap_or_default().to_vec(),
                },
            });
        }

        if first != NEGATIVE_RESPONSE_BYTE {
            return Some(Self {
                sender_id,
                service_id: first.wrapping_sub(POSITIVE_RESPONSE_OFFSET),
                body: Body::Positive {
                    subfunction: raw.get(1).copied(),
                    payload: raw.get(2..).unwrap_or_default().to_vec(),
                },
            });
        }

        if raw.len() < 3 {
            return None;
        }
        Some(Self {
            sender_id,
            service_id: raw[1],
            body: Body::Negative {
                nrc: NegativeResponseCode::from(raw[2]),
                payload: raw.get(3..).unwrap_or_default().to_vec(),
            },
        })
    }

    pub fn sender_label(&self) -> String {
        match self.sender_id {
            ECU_ID => "ECU".to_string(),
            TESTER_ID => "Tester".to_string(),
            other => format!("0x{:03X}", other),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.body {
            Body::Request { .. } => "request",
            Body::Positive { .. } => "response",
            Body::Negative { .. } => "NEGATIVE response",
        };
        write!(
            f,
            "{} from {}: service={}",
            kind,
            self.sender_label(),
            service::label(self.service_id)
        )?;
        if let Body::Negative { nrc, .. } = &self.body {
            write!(f, " nrc={}", nrc)?;
        }
        if let Some(sub) = self.subfunction() {
            write!(f, " subfunction={}", subfunction::label(self.service_id, sub))?;
        }
        let ascii = self.ascii_payload();
        if !ascii.is_empty() {
            write!(f, " ascii={:?}", ascii)?;
        }
        if !self.payload().is_empty() {
            write!(f, " data=")?;
            for byte in self.payload() {
                write!(f, "{:02X} ", byte)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_request_with_subfunction() {
        let message = Message::request_with_subfunction(TESTER_ID, 0x1A, 0x02);
        assert_eq!(message.to_raw(), vec![0x1A, 0x02]);
    }

    #[test]
    fn request_round_trips() {
        let message = Message {
            sender_id: TESTER_ID,
            service_id: 0x27,
            body: Body::Request {
                subfunction: Some(0x04),
                payload: vec![0x4D, 0x4E],
            },
        };
        let decoded = Message::from_raw(TESTER_ID, &message.to_raw(), false).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn positive_response_round_trips() {
        let message = Message {
            sender_id: ECU_ID,
            service_id: 0x1A,
            body: Body::Positive {
                subfunction: Some(0x02),
                payload: b"613.41.031.300".to_vec(),
            },
        };
        let raw = message.to_raw();
        assert_eq!(raw[0], 0x5A);
        let decoded = Message::from_raw(ECU_ID, &raw, true).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.ascii_payload(), "613.41.031.300");
    }

    #[test]
    fn decodes_negative_response() {
        let decoded = Message::from_raw(ECU_ID, &[0x7F, 0x1A, 0x12], true).unwrap();
        assert_eq!(decoded.service_id, 0x1A);
        assert_eq!(decoded.is_positive(), Some(false));
        assert_eq!(decoded.subfunction(), None);
        assert_eq!(
            decoded.nrc(),
            Some(NegativeResponseCode::SubfunctionNotSupported)
        );
        assert!(decoded.payload().is_empty());
    }

    #[test]
    fn negative_response_round_trips() {
        let message = Message {
            sender_id: ECU_ID,
            service_id: 0x31,
            body: Body::Negative {
                nrc: NegativeResponseCode::SecurityAccessDenied,
                payload: vec![0xAA],
            },
        };
        let raw = message.to_raw();
        assert_eq!(raw, vec![0x7F, 0x31, 0x33, 0xAA]);
        assert_eq!(Message::from_raw(ECU_ID, &raw, true).unwrap(), message);
    }

    #[test]
    fn empty_raw_decodes_to_none() {
        assert!(Message::from_raw(ECU_ID, &[], true).is_none());
        assert!(Message::from_raw(ECU_ID, &[0x7F, 0x1A], true).is_none());
    }

    #[test]
    fn ascii_payload_skips_unprintable_bytes() {
        let message = Message {
            sender_id: ECU_ID,
            service_id: 0x1A,
            body: Body::Positive {
                subfunction: Some(0x08),
                payload: vec![0x00, b'F', b'E', b'/', b'F', b'S', b' ', b'7', b'0', b'1', 0x07],
            },
        };
        assert_eq!(message.ascii_payload(), "FE/FS 701");
    }

    #[test]
    fn unknown_service_bytes_are_accepted() {
        // 0x03 is not a standard UDS service, the codec must not care
        let decoded = Message::from_raw(ECU_ID, &[0x43, 0x02, 0x01, 0x05], true).unwrap();
        assert_eq!(decoded.service_id, 0x03);
        assert_eq!(decoded.subfunction(), Some(0x02));
        assert_eq!(decoded.payload(), &[0x01, 0x05]);
    }
}
