//! UDS service id constants and log labels

/// Standard UDS service ids (ISO 14229).
pub mod service_id {
    pub const DIAGNOSTIC_SESSION_CONTROL: u8 = 0x10;
    pub const ECU_RESET: u8 = 0x11;
    pub const CLEAR_DIAGNOSTIC_INFORMATION: u8 = 0x14;
    pub const READ_DTC_INFORMATION: u8 = 0x19;
    pub const READ_IDENTIFICATION: u8 = 0x1A;
    pub const READ_DATA_BY_IDENTIFIER: u8 = 0x22;
    pub const READ_MEMORY_BY_ADDRESS: u8 = 0x23;
    pub const READ_SCALING_DATA_BY_IDENTIFIER: u8 = 0x24;
    pub const SECURITY_ACCESS: u8 = 0x27;
    pub const COMMUNICATION_CONTROL: u8 = 0x28;
    pub const WRITE_DATA_BY_IDENTIFIER: u8 = 0x2E;
    pub const IO_CONTROL_BY_IDENTIFIER: u8 = 0x2F;
    pub const ROUTINE_CONTROL: u8 = 0x31;
    pub const REQUEST_DOWNLOAD: u8 = 0x34;
    pub const REQUEST_UPLOAD: u8 = 0x35;
    pub const TRANSFER_DATA: u8 = 0x36;
    pub const REQUEST_TRANSFER_EXIT: u8 = 0x37;
    pub const TESTER_PRESENT: u8 = 0x3E;
    pub const CONTROL_DTC_SETTING: u8 = 0x85;
}

/// Human-readable label for a service id, for log output only.
///
/// Vendor-specific ids (the family "read errors" / "clear errors"
/// services, for instance) fall through to their hex rendering.
pub fn label(id: u8) -> String {
    use service_id::*;
    let name = match id {
        DIAGNOSTIC_SESSION_CONTROL => "Diagnostic Session Control",
        ECU_RESET => "ECU Reset",
        CLEAR_DIAGNOSTIC_INFORMATION => "Clear Diagnostic Information",
        READ_DTC_INFORMATION => "Read DTC Information",
        READ_IDENTIFICATION => "Read Identification",
        READ_DATA_BY_IDENTIFIER => "Read Data By Identifier",
        READ_MEMORY_BY_ADDRESS => "Read Memory By Address",
        READ_SCALING_DATA_BY_IDENTIFIER => "Read Scaling Data By Identifier",
        SECURITY_ACCESS => "Security Access",
        COMMUNICATION_CONTROL => "Communication Control",
        WRITE_DATA_BY_IDENTIFIER => "Write Data By Identifier",
        IO_CONTROL_BY_IDENTIFIER => "Input Output Control By Identifier",
        ROUTINE_CONTROL => "Routine Control",
        REQUEST_DOWNLOAD => "Request Download",
        REQUEST_UPLOAD => "Request Upload",
        TRANSFER_DATA => "Transfer Data",
        REQUEST_TRANSFER_EXIT => "Request Transfer Exit",
        TESTER_PRESENT => "Tester Present",
        CONTROL_DTC_SETTING => "Control DTC Setting",
        other => return format!("0x{:02X}", other),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_known_and_unknown_services() {
        assert_eq!(label(0x3E), "Tester Present");
        assert_eq!(label(0x03), "0x03");
    }
}
