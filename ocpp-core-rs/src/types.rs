//! OCPP 1.6 message kinds and enumerations
//!
//! Covers what the engine and the configuration store need:
//! - `MessageType`: every OCPP 1.6 action (Core and the optional profiles)
//! - `MessageRole`: envelope role, with the OCPP-J wire codes
//! - comma-separated-list flags used by configuration values
//!   (`Measurand`, `FeatureProfile`, `ChargingRateUnit`) and `PhaseRotation`
//! - `RegistrationStatus` from BootNotification.conf

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to map a string onto one of the enumerations in this module
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ============================================================================
// Envelope role
// ============================================================================

/// Role of a message record.
///
/// `None` and `Allocated` describe slot states and never travel on the wire;
/// the remaining discriminants are the OCPP-J message type ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageRole {
    None = 0,
    Allocated = 1,
    Call = 2,
    CallResult = 3,
    CallError = 4,
}

impl MessageRole {
    /// Map an OCPP-J message type id onto a role
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            2 => Some(MessageRole::Call),
            3 => Some(MessageRole::CallResult),
            4 => Some(MessageRole::CallError),
            _ => None,
        }
    }

    /// CallResult or CallError
    pub fn is_response(self) -> bool {
        matches!(self, MessageRole::CallResult | MessageRole::CallError)
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// Message types
// ============================================================================

/// OCPP 1.6 action names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Core
    Authorize,
    BootNotification,
    ChangeAvailability,
    ChangeConfiguration,
    ClearCache,
    DataTransfer,
    GetConfiguration,
    Heartbeat,
    MeterValues,
    RemoteStartTransaction,
    RemoteStopTransaction,
    Reset,
    StartTransaction,
    StatusNotification,
    StopTransaction,
    UnlockConnector,

    // Firmware Management
    DiagnosticsStatusNotification,
    FirmwareStatusNotification,
    GetDiagnostics,
    UpdateFirmware,

    // Local Auth List Management
    GetLocalListVersion,
    SendLocalList,

    // Reservation
    CancelReservation,
    ReserveNow,

    // Smart Charging
    ClearChargingProfile,
    GetCompositeSchedule,
    SetChargingProfile,

    // Remote Trigger
    TriggerMessage,

    // Security extension
    CertificateSigned,
    DeleteCertificate,
    ExtendedTriggerMessage,
    GetInstalledCertificateIds,
    GetLog,
    InstallCertificate,
    LogStatusNotification,
    SecurityEventNotification,
    SignCertificate,
    SignedFirmwareStatusNotification,
    SignedUpdateFirmware,
}

impl MessageType {
    pub const ALL: [MessageType; 39] = [
        MessageType::Authorize,
        MessageType::BootNotification,
        MessageType::ChangeAvailability,
        MessageType::ChangeConfiguration,
        MessageType::ClearCache,
        MessageType::DataTransfer,
        MessageType::GetConfiguration,
        MessageType::Heartbeat,
        MessageType::MeterValues,
        MessageType::RemoteStartTransaction,
        MessageType::RemoteStopTransaction,
        MessageType::Reset,
        MessageType::StartTransaction,
        MessageType::StatusNotification,
        MessageType::StopTransaction,
        MessageType::UnlockConnector,
        MessageType::DiagnosticsStatusNotification,
        MessageType::FirmwareStatusNotification,
        MessageType::GetDiagnostics,
        MessageType::UpdateFirmware,
        MessageType::GetLocalListVersion,
        MessageType::SendLocalList,
        MessageType::CancelReservation,
        MessageType::ReserveNow,
        MessageType::ClearChargingProfile,
        MessageType::GetCompositeSchedule,
        MessageType::SetChargingProfile,
        MessageType::TriggerMessage,
        MessageType::CertificateSigned,
        MessageType::DeleteCertificate,
        MessageType::ExtendedTriggerMessage,
        MessageType::GetInstalledCertificateIds,
        MessageType::GetLog,
        MessageType::InstallCertificate,
        MessageType::LogStatusNotification,
        MessageType::SecurityEventNotification,
        MessageType::SignCertificate,
        MessageType::SignedFirmwareStatusNotification,
        MessageType::SignedUpdateFirmware,
    ];

    /// Action name as it appears in an OCPP-J CALL frame
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Authorize => "Authorize",
            MessageType::BootNotification => "BootNotification",
            MessageType::ChangeAvailability => "ChangeAvailability",
            MessageType::ChangeConfiguration => "ChangeConfiguration",
            MessageType::ClearCache => "ClearCache",
            MessageType::DataTransfer => "DataTransfer",
            MessageType::GetConfiguration => "GetConfiguration",
            MessageType::Heartbeat => "Heartbeat",
            MessageType::MeterValues => "MeterValues",
            MessageType::RemoteStartTransaction => "RemoteStartTransaction",
            MessageType::RemoteStopTransaction => "RemoteStopTransaction",
            MessageType::Reset => "Reset",
            MessageType::StartTransaction => "StartTransaction",
            MessageType::StatusNotification => "StatusNotification",
            MessageType::StopTransaction => "StopTransaction",
            MessageType::UnlockConnector => "UnlockConnector",
            MessageType::DiagnosticsStatusNotification => "DiagnosticsStatusNotification",
            MessageType::FirmwareStatusNotification => "FirmwareStatusNotification",
            MessageType::GetDiagnostics => "GetDiagnostics",
            MessageType::UpdateFirmware => "UpdateFirmware",
            MessageType::GetLocalListVersion => "GetLocalListVersion",
            MessageType::SendLocalList => "SendLocalList",
            MessageType::CancelReservation => "CancelReservation",
            MessageType::ReserveNow => "ReserveNow",
            MessageType::ClearChargingProfile => "ClearChargingProfile",
            MessageType::GetCompositeSchedule => "GetCompositeSchedule",
            MessageType::SetChargingProfile => "SetChargingProfile",
            MessageType::TriggerMessage => "TriggerMessage",
            MessageType::CertificateSigned => "CertificateSigned",
            MessageType::DeleteCertificate => "DeleteCertificate",
            MessageType::ExtendedTriggerMessage => "ExtendedTriggerMessage",
            MessageType::GetInstalledCertificateIds => "GetInstalledCertificateIds",
            MessageType::GetLog => "GetLog",
            MessageType::InstallCertificate => "InstallCertificate",
            MessageType::LogStatusNotification => "LogStatusNotification",
            MessageType::SecurityEventNotification => "SecurityEventNotification",
            MessageType::SignCertificate => "SignCertificate",
            MessageType::SignedFirmwareStatusNotification => "SignedFirmwareStatusNotification",
            MessageType::SignedUpdateFirmware => "SignedUpdateFirmware",
        }
    }

    /// BootNotification, StartTransaction and StopTransaction.
    ///
    /// These carry registration and billing state, so they are never evicted
    /// and never dropped for transport failures or missing responses.
    pub fn is_transaction_related(self) -> bool {
        matches!(
            self,
            MessageType::BootNotification
                | MessageType::StartTransaction
                | MessageType::StopTransaction
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("message type", s))
    }
}

// ============================================================================
// BootNotification
// ============================================================================

/// Registration status for BootNotification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RegistrationStatus {
    Accepted,
    Pending,
    Rejected,
}

impl FromStr for RegistrationStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Accepted" => Ok(RegistrationStatus::Accepted),
            "Pending" => Ok(RegistrationStatus::Pending),
            "Rejected" => Ok(RegistrationStatus::Rejected),
            _ => Err(ParseEnumError::new("registration status", s)),
        }
    }
}

// ============================================================================
// Comma-separated-list flags
// ============================================================================

/// Enumeration stored as a bit in a CSL configuration value
pub trait CslFlag: Copy + 'static {
    const KIND: &'static str;
    const ALL: &'static [Self];

    fn bit(self) -> u32;
    fn as_str(self) -> &'static str;
}

/// Render the set bits of `mask` as "A,B,C" in declaration order
pub fn join_flags<F: CslFlag>(mask: u32) -> String {
    F::ALL
        .iter()
        .filter(|flag| mask & flag.bit() != 0)
        .map(|flag| flag.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse "A,B,C" into a bit mask; whitespace around items is ignored
pub fn parse_flags<F: CslFlag>(list: &str) -> Result<u32, ParseEnumError> {
    let mut mask = 0;
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let flag = F::ALL
            .iter()
            .find(|flag| flag.as_str() == item)
            .ok_or_else(|| ParseEnumError::new(F::KIND, item))?;
        mask |= flag.bit();
    }
    Ok(mask)
}

/// Measurand types for meter values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measurand {
    CurrentExport,
    CurrentImport,
    CurrentOffered,
    EnergyActiveExportRegister,
    EnergyActiveImportRegister,
    EnergyReactiveExportRegister,
    EnergyReactiveImportRegister,
    EnergyActiveExportInterval,
    EnergyActiveImportInterval,
    EnergyReactiveExportInterval,
    EnergyReactiveImportInterval,
    Frequency,
    PowerActiveExport,
    PowerActiveImport,
    PowerFactor,
    PowerOffered,
    PowerReactiveExport,
    PowerReactiveImport,
    Rpm,
    SoC,
    Temperature,
    Voltage,
}

impl CslFlag for Measurand {
    const KIND: &'static str = "measurand";
    const ALL: &'static [Self] = &[
        Measurand::CurrentExport,
        Measurand::CurrentImport,
        Measurand::CurrentOffered,
        Measurand::EnergyActiveExportRegister,
        Measurand::EnergyActiveImportRegister,
        Measurand::EnergyReactiveExportRegister,
        Measurand::EnergyReactiveImportRegister,
        Measurand::EnergyActiveExportInterval,
        Measurand::EnergyActiveImportInterval,
        Measurand::EnergyReactiveExportInterval,
        Measurand::EnergyReactiveImportInterval,
        Measurand::Frequency,
        Measurand::PowerActiveExport,
        Measurand::PowerActiveImport,
        Measurand::PowerFactor,
        Measurand::PowerOffered,
        Measurand::PowerReactiveExport,
        Measurand::PowerReactiveImport,
        Measurand::Rpm,
        Measurand::SoC,
        Measurand::Temperature,
        Measurand::Voltage,
    ];

    fn bit(self) -> u32 {
        1 << (self as u32)
    }

    fn as_str(self) -> &'static str {
        match self {
            Measurand::CurrentExport => "Current.Export",
            Measurand::CurrentImport => "Current.Import",
            Measurand::CurrentOffered => "Current.Offered",
            Measurand::EnergyActiveExportRegister => "Energy.Active.Export.Register",
            Measurand::EnergyActiveImportRegister => "Energy.Active.Import.Register",
            Measurand::EnergyReactiveExportRegister => "Energy.Reactive.Export.Register",
            Measurand::EnergyReactiveImportRegister => "Energy.Reactive.Import.Register",
            Measurand::EnergyActiveExportInterval => "Energy.Active.Export.Interval",
            Measurand::EnergyActiveImportInterval => "Energy.Active.Import.Interval",
            Measurand::EnergyReactiveExportInterval => "Energy.Reactive.Export.Interval",
            Measurand::EnergyReactiveImportInterval => "Energy.Reactive.Import.Interval",
            Measurand::Frequency => "Frequency",
            Measurand::PowerActiveExport => "Power.Active.Export",
            Measurand::PowerActiveImport => "Power.Active.Import",
            Measurand::PowerFactor => "Power.Factor",
            Measurand::PowerOffered => "Power.Offered",
            Measurand::PowerReactiveExport => "Power.Reactive.Export",
            Measurand::PowerReactiveImport => "Power.Reactive.Import",
            Measurand::Rpm => "RPM",
            Measurand::SoC => "SoC",
            Measurand::Temperature => "Temperature",
            Measurand::Voltage => "Voltage",
        }
    }
}

impl FromStr for Measurand {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Measurand::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ParseEnumError::new(Self::KIND, s))
    }
}

/// Feature profiles reported by SupportedFeatureProfiles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureProfile {
    Core,
    FirmwareManagement,
    LocalAuthListManagement,
    Reservation,
    SmartCharging,
    RemoteTrigger,
}

impl CslFlag for FeatureProfile {
    const KIND: &'static str = "feature profile";
    const ALL: &'static [Self] = &[
        FeatureProfile::Core,
        FeatureProfile::FirmwareManagement,
        FeatureProfile::LocalAuthListManagement,
        FeatureProfile::Reservation,
        FeatureProfile::SmartCharging,
        FeatureProfile::RemoteTrigger,
    ];

    fn bit(self) -> u32 {
        1 << (self as u32)
    }

    fn as_str(self) -> &'static str {
        match self {
            FeatureProfile::Core => "Core",
            FeatureProfile::FirmwareManagement => "FirmwareManagement",
            FeatureProfile::LocalAuthListManagement => "LocalAuthListManagement",
            FeatureProfile::Reservation => "Reservation",
            FeatureProfile::SmartCharging => "SmartCharging",
            FeatureProfile::RemoteTrigger => "RemoteTrigger",
        }
    }
}

/// Charging rate units accepted in charging schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingRateUnit {
    Power,
    Current,
}

impl CslFlag for ChargingRateUnit {
    const KIND: &'static str = "charging rate unit";
    const ALL: &'static [Self] = &[ChargingRateUnit::Power, ChargingRateUnit::Current];

    fn bit(self) -> u32 {
        1 << (self as u32)
    }

    fn as_str(self) -> &'static str {
        match self {
            ChargingRateUnit::Power => "Power",
            ChargingRateUnit::Current => "Current",
        }
    }
}

/// Connector phase rotation, stored by index rather than as a bit mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseRotation {
    NotApplicable,
    Unknown,
    Rst,
    Rts,
    Srt,
    Str,
    Trs,
    Tsr,
}

impl PhaseRotation {
    pub const ALL: [PhaseRotation; 8] = [
        PhaseRotation::NotApplicable,
        PhaseRotation::Unknown,
        PhaseRotation::Rst,
        PhaseRotation::Rts,
        PhaseRotation::Srt,
        PhaseRotation::Str,
        PhaseRotation::Trs,
        PhaseRotation::Tsr,
    ];

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseRotation::NotApplicable => "NotApplicable",
            PhaseRotation::Unknown => "Unknown",
            PhaseRotation::Rst => "RST",
            PhaseRotation::Rts => "RTS",
            PhaseRotation::Srt => "SRT",
            PhaseRotation::Str => "STR",
            PhaseRotation::Trs => "TRS",
            PhaseRotation::Tsr => "TSR",
        }
    }
}

impl FromStr for PhaseRotation {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PhaseRotation::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("phase rotation", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_names() {
        assert_eq!(MessageType::BootNotification.to_string(), "BootNotification");
        assert_eq!(
            "BootNotification".parse::<MessageType>(),
            Ok(MessageType::BootNotification)
        );
        assert!("UnknownType".parse::<MessageType>().is_err());

        for t in MessageType::ALL {
            assert_eq!(t.as_str().parse::<MessageType>(), Ok(t));
        }
    }

    #[test]
    fn test_transaction_related() {
        let related: Vec<_> = MessageType::ALL
            .iter()
            .filter(|t| t.is_transaction_related())
            .collect();

        assert_eq!(
            related,
            vec![
                &MessageType::BootNotification,
                &MessageType::StartTransaction,
                &MessageType::StopTransaction,
            ]
        );
    }

    #[test]
    fn test_role_codes() {
        assert_eq!(MessageRole::from_code(2), Some(MessageRole::Call));
        assert_eq!(MessageRole::from_code(4), Some(MessageRole::CallError));
        assert_eq!(MessageRole::from_code(1), None);
        assert!(MessageRole::CallResult.is_response());
        assert!(!MessageRole::Call.is_response());
    }

    #[test]
    fn test_measurand_parsing() {
        assert_eq!("Frequency".parse::<Measurand>(), Ok(Measurand::Frequency));
        assert!("Invalid".parse::<Measurand>().is_err());
    }

    #[test]
    fn test_flag_lists() {
        let mask = Measurand::CurrentImport.bit() | Measurand::Voltage.bit();
        assert_eq!(join_flags::<Measurand>(mask), "Current.Import,Voltage");
        assert_eq!(parse_flags::<Measurand>("Voltage, Current.Import"), Ok(mask));
        assert_eq!(parse_flags::<Measurand>(""), Ok(0));
        assert!(parse_flags::<FeatureProfile>("Core,Bogus").is_err());
    }

    #[test]
    fn test_registration_status() {
        assert_eq!(
            "Accepted".parse::<RegistrationStatus>(),
            Ok(RegistrationStatus::Accepted)
        );
        assert!("accepted".parse::<RegistrationStatus>().is_err());
    }
}
