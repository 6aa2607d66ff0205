//! UDS subfunction constants and log labels

use crate::service::service_id;

/// Diagnostic Session Control subfunctions.
pub mod session_type {
    pub const DEFAULT: u8 = 0x01;
    pub const PROGRAMMING: u8 = 0x02;
    pub const EXTENDED_DIAGNOSTIC: u8 = 0x03;
    pub const SAFETY_SYSTEM_DIAGNOSTIC: u8 = 0x04;
}

/// ECU Reset subfunctions.
pub mod reset_type {
    pub const HARD: u8 = 0x01;
    pub const KEY_OFF_ON: u8 = 0x02;
    pub const SOFT: u8 = 0x03;
}

/// Security Access subfunctions.
///
/// Each access level uses a pair: the seed request is the odd
/// subfunction (`level * 2 - 1`), the key send the even one after it.
pub mod security_access {
    pub const REQUEST_SEED: u8 = 0x01;
    pub const SEND_KEY: u8 = 0x02;
}

/// Routine Control subfunctions.
pub mod routine {
    pub const START: u8 = 0x01;
    pub const STOP: u8 = 0x02;
    pub const REQUEST_RESULTS: u8 = 0x03;
}

/// Communication Control subfunctions.
pub mod communication_control {
    pub const ENABLE_RX_AND_TX: u8 = 0x00;
    pub const ENABLE_RX_DISABLE_TX: u8 = 0x01;
    pub const DISABLE_RX_ENABLE_TX: u8 = 0x02;
    pub const DISABLE_RX_AND_TX: u8 = 0x03;
}

/// Control DTC Setting subfunctions.
pub mod dtc_setting {
    pub const ON: u8 = 0x01;
    pub const OFF: u8 = 0x02;
}

/// Read Identification (0x1A) subfunctions of the supported ECU families.
pub mod read_identification {
    pub const VIN: u8 = 0x01;
    pub const HARDWARE_ID: u8 = 0x02;
    pub const SOFTWARE_ID: u8 = 0x05;
    pub const COUNTRY: u8 = 0x06;
    pub const MANUFACTURER: u8 = 0x07;
    pub const MODEL: u8 = 0x08;
}

/// Human-readable label for a subfunction in the context of its service.
pub fn label(service: u8, sub: u8) -> String {
    let name = match service {
        service_id::DIAGNOSTIC_SESSION_CONTROL => match sub {
            session_type::DEFAULT => "Default Session",
            session_type::PROGRAMMING => "Programming Session",
            session_type::EXTENDED_DIAGNOSTIC => "Extended Diagnostic Session",
            session_type::SAFETY_SYSTEM_DIAGNOSTIC => "Safety System Diagnostic Session",
            _ => return format!("0x{:02X}", sub),
        },
        service_id::ECU_RESET => match sub {
            reset_type::HARD => "Hard Reset",
            reset_type::KEY_OFF_ON => "Key Off On Reset",
            reset_type::SOFT => "Soft Reset",
            _ => return format!("0x{:02X}", sub),
        },
        service_id::SECURITY_ACCESS => match sub {
            0x00 => return format!("0x{:02X}", sub),
            odd if odd % 2 == 1 => "Request Seed",
            _ => "Send Key",
        },
        service_id::ROUTINE_CONTROL => match sub {
            routine::START => "Start Routine",
            routine::STOP => "Stop Routine",
            routine::REQUEST_RESULTS => "Request Routine Results",
            _ => return format!("0x{:02X}", sub),
        },
        service_id::COMMUNICATION_CONTROL => match sub {
            communication_control::ENABLE_RX_AND_TX => "Enable Rx and Tx",
            communication_control::ENABLE_RX_DISABLE_TX => "Enable Rx and Disable Tx",
            communication_control::DISABLE_RX_ENABLE_TX => "Disable Rx and Enable Tx",
            communication_control::DISABLE_RX_AND_TX => "Disable Rx and Tx",
            _ => return format!("0x{:02X}", sub),
        },
        service_id::CONTROL_DTC_SETTING => match sub {
            dtc_setting::ON => "DTC Setting On",
            dtc_setting::OFF => "DTC Setting Off",
            _ => return format!("0x{:02X}", sub),
        },
        service_id::READ_IDENTIFICATION => match sub {
            read_identification::VIN => "Read VIN",
            read_identification::HARDWARE_ID => "Read ECU Hardware Id",
            read_identification::SOFTWARE_ID => "Read ECU Software Id",
            read_identification::COUNTRY => "Read Manufacturer Country Code",
            read_identification::MANUFACTURER => "Read Brand",
            read_identification::MODEL => "Read Model",
            _ => return format!("0x{:02X}", sub),
        },
        _ => return format!("0x{:02X}", sub),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_depend_on_the_service() {
        assert_eq!(label(0x1A, 0x02), "Read ECU Hardware Id");
        assert_eq!(label(0x10, 0x02), "Programming Session");
        assert_eq!(label(0x99, 0x02), "0x02");
    }

    #[test]
    fn security_access_levels_share_the_seed_key_labels() {
        assert_eq!(label(0x27, security_access::REQUEST_SEED), "Request Seed");
        assert_eq!(label(0x27, security_access::SEND_KEY), "Send Key");
        // level 2 uses the 0x03/0x04 pair
        assert_eq!(label(0x27, 0x03), "Request Seed");
        assert_eq!(label(0x27, 0x04), "Send Key");
        assert_eq!(label(0x27, 0x00), "0x00");
    }
}
