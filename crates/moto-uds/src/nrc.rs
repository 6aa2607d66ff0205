//! UDS negative response codes

use std::fmt;

/// Negative response code of a UDS negative response.
///
/// Unknown byte values are preserved verbatim; the code is a label, not a
/// validation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegativeResponseCode {
    GeneralReject,
    ServiceNotSupported,
    SubfunctionNotSupported,
    IncorrectMessageLengthOrFormat,
    ResponseTooLong,
    BusyRepeatRequest,
    ConditionsNotCorrect,
    RequestSequenceError,
    NoResponseFromSubnetComponent,
    FailurePreventsExecution,
    RequestOutOfRange,
    SecurityAccessDenied,
    InvalidKey,
    ExceededNumberOfAttempts,
    RequiredTimeDelayNotExpired,
    UploadDownloadNotAccepted,
    TransferDataSuspended,
    GeneralProgrammingFailure,
    WrongBlockSequenceCounter,
    ResponsePending,
    SubfunctionNotSupportedInActiveSession,
    ServiceNotSupportedInActiveSession,
    VehicleSpeedTooHigh,
    RpmTooHigh,
    RpmTooLow,
    EngineIsRunning,
    EngineIsNotRunning,
    EngineRunTimeTooLow,
    TemperatureTooHigh,
    TemperatureTooLow,
    ThrottlePedalTooHigh,
    ThrottlePedalTooLow,
    TransmissionRangeNotInNeutral,
    TransmissionRangeNotInGear,
    BrakeSwitchNotClosed,
    ShifterLeverNotInPark,
    TorqueConverterClutchLocked,
    VoltageTooHigh,
    VoltageTooLow,
    Unknown(u8),
}

impl From<u8> for NegativeResponseCode {
    fn from(value: u8) -> Self {
        match value {
            0x10 => Self::GeneralReject,
            0x11 => Self::ServiceNotSupported,
            0x12 => Self::SubfunctionNotSupported,
            0x13 => Self::IncorrectMessageLengthOrFormat,
            0x14 => Self::ResponseTooLong,
            0x21 => Self::BusyRepeatRequest,
            0x22 => Self::ConditionsNotCorrect,
            0x24 => Self::RequestSequenceError,
            0x25 => Self::NoResponseFromSubnetComponent,
            0x26 => Self::FailurePreventsExecution,
            0x31 => Self::RequestOutOfRange,
            0x33 => Self::SecurityAccessDenied,
            0x35 => Self::InvalidKey,
            0x36 => Self::ExceededNumberOfAttempts,
            0x37 => Self::RequiredTimeDelayNotExpired,
            0x70 => Self::UploadDownloadNotAccepted,
            0x71 => Self::TransferDataSuspended,
            0x72 => Self::GeneralProgrammingFailure,
            0x73 => Self::WrongBlockSequenceCounter,
            0x78 => Self::ResponsePending,
            0x7E => Self::SubfunctionNotSupportedInActiveSession,
            0x7F => Self::ServiceNotSupportedInActiveSession,
            0x81 => Self::VehicleSpeedTooHigh,
            0x82 => Self::RpmTooHigh,
            0x83 => Self::RpmTooLow,
            0x84 => Self::EngineIsRunning,
            0x85 => Self::EngineIsNotRunning,
            0x86 => Self::EngineRunTimeTooLow,
            0x87 => Self::TemperatureTooHigh,
            0x88 => Self::TemperatureTooLow,
            0x89 => Self::ThrottlePedalTooHigh,
            0x8A => Self::ThrottlePedalTooLow,
            0x8B => Self::TransmissionRangeNotInNeutral,
            0x8C => Self::TransmissionRangeNotInGear,
            0x8D => Self::BrakeSwitchNotClosed,
            0x8F => Self::ShifterLeverNotInPark,
            0x90 => Self::TorqueConverterClutchLocked,
            0x91 => Self::VoltageTooHigh,
            0x92 => Self::VoltageTooLow,
            other => Self::Unknown(other),
        }
    }
}

impl From<NegativeResponseCode> for u8 {
    fn from(nrc: NegativeResponseCode) -> Self {
        use NegativeResponseCode::*;
        match nrc {
            GeneralReject => 0x10,
            ServiceNotSupported => 0x11,
            SubfunctionNotSupported => 0x12,
            IncorrectMessageLengthOrFormat => 0x13,
            ResponseTooLong => 0x14,
            BusyRepeatRequest => 0x21,
            ConditionsNotCorrect => 0x22,
            RequestSequenceError => 0x24,
            NoResponseFromSubnetComponent => 0x25,
            FailurePreventsExecution => 0x26,
            RequestOutOfRange => 0x31,
            SecurityAccessDenied => 0x33,
            InvalidKey => 0x35,
            ExceededNumberOfAttempts => 0x36,
            RequiredTimeDelayNotExpired => 0x37,
            UploadDownloadNotAccepted => 0x70,
            TransferDataSuspended => 0x71,
            GeneralProgrammingFailure => 0x72,
            WrongBlockSequenceCounter => 0x73,
            ResponsePending => 0x78,
            SubfunctionNotSupportedInActiveSession => 0x7E,
            ServiceNotSupportedInActiveSession => 0x7F,
            VehicleSpeedTooHigh => 0x81,
            RpmTooHigh => 0x82,
            RpmTooLow => 0x83,
            EngineIsRunning => 0x84,
            EngineIsNotRunning => 0x85,
            EngineRunTimeTooLow => 0x86,
            TemperatureTooHigh => 0x87,
            TemperatureTooLow => 0x88,
            ThrottlePedalTooHigh => 0x89,
            ThrottlePedalTooLow => 0x8A,
            TransmissionRangeNotInNeutral => 0x8B,
            TransmissionRangeNotInGear => 0x8C,
            BrakeSwitchNotClosed => 0x8D,
            ShifterLeverNotInPark => 0x8F,
            TorqueConverterClutchLocked => 0x90,
            VoltageTooHigh => 0x91,
            VoltageTooLow => 0x92,
            Unknown(value) => value,
        }
    }
}

impl fmt::Display for NegativeResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use NegativeResponseCode::*;
        let name = match self {
            GeneralReject => "General Reject",
            ServiceNotSupported => "Service Not Supported",
            SubfunctionNotSupported => "Subfunction Not Supported",
            IncorrectMessageLengthOrFormat => "Incorrect Message Length or Invalid Format",
            ResponseTooLong => "Response Too Long",
            BusyRepeatRequest => "Busy Repeat Request",
            ConditionsNotCorrect => "Conditions Not Correct",
            RequestSequenceError => "Request Sequence Error",
            NoResponseFromSubnetComponent => "No Response From Subnet Component",
            FailurePreventsExecution => "Failure Prevents Execution of Requested Action",
            RequestOutOfRange => "Request Out of Range",
            SecurityAccessDenied => "Security Access Denied",
            InvalidKey => "Invalid Key",
            ExceededNumberOfAttempts => "Exceeded Number of Attempts",
            RequiredTimeDelayNotExpired => "Required Time Delay Not Expired",
            UploadDownloadNotAccepted => "Upload/Download Not Accepted",
            TransferDataSuspended => "Transfer Data Suspended",
            GeneralProgrammingFailure => "General Programming Failure",
            WrongBlockSequenceCounter => "Wrong Block Sequence Counter",
            ResponsePending => "Request Correctly Received - Response Pending",
            SubfunctionNotSupportedInActiveSession => {
                "Subfunction Not Supported in Active Session"
            }
            ServiceNotSupportedInActiveSession => "Service Not Supported in Active Session",
            VehicleSpeedTooHigh => "Vehicle Speed Too High",
            RpmTooHigh => "RPM Too High",
            RpmTooLow => "RPM Too Low",
            EngineIsRunning => "Engine is Running",
            EngineIsNotRunning => "Engine is Not Running",
            EngineRunTimeTooLow => "Engine Run Time Too Low",
            TemperatureTooHigh => "Temperature Too High",
            TemperatureTooLow => "Temperature Too Low",
            ThrottlePedalTooHigh => "Throttle Pedal Too High",
            ThrottlePedalTooLow => "Throttle Pedal Too Low",
            TransmissionRangeNotInNeutral => "Transmission Range Not In Neutral",
            TransmissionRangeNotInGear => "Transmission Range Not In Gear",
            BrakeSwitchNotClosed => "Brake Switch Not Closed",
            ShifterLeverNotInPark => "Shifter Lever Not In Park",
            TorqueConverterClutchLocked => "Torque Converter Clutch Locked",
            VoltageTooHigh => "Voltage Too High",
            VoltageTooLow => "Voltage Too Low",
            Unknown(value) => return write!(f, "0x{:02X}", value),
        };
        f.write_str(name)
    }
}
