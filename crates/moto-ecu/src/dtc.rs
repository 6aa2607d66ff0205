//! Diagnostic trouble code parsing and description lookup

use std::fmt;

/// A diagnostic trouble code read from the ECU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dtc {
    /// Four hex digit code, e.g. `"1590"`.
    pub code: String,
    /// Description from the dictionary, when the code is known.
    pub description: Option<String>,
}

impl fmt::Display for Dtc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}: {}", self.code, description),
            None => f.write_str(&self.code),
        }
    }
}

/// External description dictionary.
///
/// The contents are device-family documentation, not part of the core;
/// unknown codes simply pass through verbatim.
pub trait DtcDictionary: Send + Sync {
    fn describe(&self, code: &str) -> Option<String>;
}

/// Dictionary that knows no codes.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyDictionary;

impl DtcDictionary for EmptyDictionary {
    fn describe(&self, _code: &str) -> Option<String> {
        None
    }
}

/// Scan a read-errors response payload as two-byte DTC groups.
///
/// A trailing odd byte carries no code and is ignored.
pub fn parse_dtc_payload(payload: &[u8], dictionary: &dyn DtcDictionary) -> Vec<Dtc> {
    payload
        .chunks_exact(2)
        .map(|pair| {
            let code = format!("{:02X}{:02X}", pair[0], pair[1]);
            let description = dictionary.describe(&code);
            Dtc { code, description }
        })
        .collect()
}
