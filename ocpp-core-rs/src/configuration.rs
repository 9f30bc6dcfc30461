//! OCPP 1.6 configuration keys
//!
//! A declarative table of the standard keys (Core, Local Auth List,
//! Reservation, Smart Charging and the security extension) with their access
//! rights, value types and defaults. Defaults are written in the same textual
//! form `ChangeConfiguration` uses and parsed when the store is built.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::types::{
    join_flags, parse_flags, ChargingRateUnit, FeatureProfile, Measurand, PhaseRotation,
};

/// Store shared between the engine and the embedder
pub type SharedConfiguration = Arc<RwLock<Configuration>>;

pub const HEARTBEAT_INTERVAL: &str = "HeartbeatInterval";
pub const TRANSACTION_MESSAGE_ATTEMPTS: &str = "TransactionMessageAttempts";
pub const TRANSACTION_MESSAGE_RETRY_INTERVAL: &str = "TransactionMessageRetryInterval";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("configuration key {0} is read-only")]
    ReadOnly(String),

    #[error("configuration key {key} holds {expected}")]
    TypeMismatch { key: String, expected: ValueType },

    #[error("value for {key} exceeds {max} characters")]
    ValueTooLarge { key: String, max: usize },

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;

/// Who may touch a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn readable(self) -> bool {
        !matches!(self, Access::Write)
    }

    pub fn writable(self) -> bool {
        !matches!(self, Access::Read)
    }
}

/// Enumeration behind a comma-separated-list key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CslKind {
    Measurands,
    FeatureProfiles,
    /// Single value stored by index
    PhaseRotation,
    ChargingRateUnits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Int,
    Bool,
    Csl(CslKind),
    /// String with a maximum length
    Str(usize),
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int => f.write_str("an integer"),
            ValueType::Bool => f.write_str("a boolean"),
            ValueType::Csl(_) => f.write_str("a comma-separated list"),
            ValueType::Str(max) => write!(f, "a string of up to {} characters", max),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Int(i32),
    Bool(bool),
    /// Bit mask, or an index for phase rotation
    Csl(u32),
    Str(String),
}

impl Value {
    fn matches(&self, kind: ValueType) -> bool {
        matches!(
            (self, kind),
            (Value::Int(_), ValueType::Int)
                | (Value::Bool(_), ValueType::Bool)
                | (Value::Csl(_), ValueType::Csl(_))
                | (Value::Str(_), ValueType::Str(_))
        )
    }

    fn empty(kind: ValueType) -> Self {
        match kind {
            ValueType::Int => Value::Int(0),
            ValueType::Bool => Value::Bool(false),
            ValueType::Csl(_) => Value::Csl(0),
            ValueType::Str(_) => Value::Str(String::new()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Definition {
    key: &'static str,
    access: Access,
    kind: ValueType,
    default: &'static str,
}

const fn def(key: &'static str, access: Access, kind: ValueType, default: &'static str) -> Definition {
    Definition {
        key,
        access,
        kind,
        default,
    }
}

use Access::{Read as R, ReadWrite as RW, Write as W};
use ValueType::{Bool, Int};

const MEASURANDS: ValueType = ValueType::Csl(CslKind::Measurands);

static DEFINITIONS: &[Definition] = &[
    // Core
    def("AllowOfflineTxForUnknownId", RW, Bool, "false"),
    def("AuthorizationCacheEnabled", RW, Bool, "false"),
    def("AuthorizeRemoteTxRequests", RW, Bool, "false"),
    def("BlinkRepeat", RW, Int, "0"),
    def("ClockAlignedDataInterval", RW, Int, "0"),
    def("ConnectionTimeOut", RW, Int, "120"),
    def("ConnectorPhaseRotation", RW, ValueType::Csl(CslKind::PhaseRotation), "NotApplicable"),
    def("ConnectorPhaseRotationMaxLength", R, Int, "1"),
    def("GetConfigurationMaxKeys", R, Int, "50"),
    def(HEARTBEAT_INTERVAL, RW, Int, "60"),
    def("LightIntensity", RW, Int, "0"),
    def("LocalAuthorizeOffline", RW, Bool, "false"),
    def("LocalPreAuthorize", RW, Bool, "false"),
    def("MaxEnergyOnInvalidId", RW, Int, "0"),
    def("MeterValuesAlignedData", RW, MEASURANDS, "Energy.Active.Import.Register"),
    def("MeterValuesAlignedDataMaxLength", R, Int, "22"),
    def("MeterValuesSampledData", RW, MEASURANDS, "Energy.Active.Import.Register"),
    def("MeterValuesSampledDataMaxLength", R, Int, "22"),
    def("MeterValueSampleInterval", RW, Int, "0"),
    def("MinimumStatusDuration", RW, Int, "0"),
    def("NumberOfConnectors", R, Int, "1"),
    def("ResetRetries", RW, Int, "0"),
    def("StopTransactionOnEVSideDisconnect", RW, Bool, "true"),
    def("StopTransactionOnInvalidId", RW, Bool, "true"),
    def("StopTxnAlignedData", RW, MEASURANDS, ""),
    def("StopTxnAlignedDataMaxLength", R, Int, "22"),
    def("StopTxnSampledData", RW, MEASURANDS, ""),
    def("StopTxnSampledDataMaxLength", R, Int, "22"),
    def("SupportedFeatureProfiles", R, ValueType::Csl(CslKind::FeatureProfiles), "Core"),
    def("SupportedFeatureProfilesMaxLength", R, Int, "6"),
    def(TRANSACTION_MESSAGE_ATTEMPTS, RW, Int, "3"),
    def(TRANSACTION_MESSAGE_RETRY_INTERVAL, RW, Int, "60"),
    def("UnlockConnectorOnEVSideDisconnect", RW, Bool, "true"),
    def("WebSocketPingInterval", RW, Int, "0"),
    // Local Auth List Management
    def("LocalAuthListEnabled", RW, Bool, "false"),
    def("LocalAuthListMaxLength", R, Int, "0"),
    def("SendLocalListMaxLength", R, Int, "0"),
    // Reservation
    def("ReserveConnectorZeroSupported", R, Bool, "false"),
    // Smart Charging
    def("ChargeProfileMaxStackLevel", R, Int, "0"),
    def(
        "ChargingScheduleAllowedChargingRateUnit",
        R,
        ValueType::Csl(CslKind::ChargingRateUnits),
        "Current",
    ),
    def("ChargingScheduleMaxPeriods", R, Int, "0"),
    def("ConnectorSwitch3to1PhaseSupported", R, Bool, "false"),
    def("MaxChargingProfilesInstalled", R, Int, "0"),
    // Security extension
    def("AuthorizationKey", W, ValueType::Str(40), ""),
    def("CpoName", RW, ValueType::Str(50), ""),
    def("SecurityProfile", RW, Int, "0"),
];

/// One key as reported to `GetConfiguration`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry<'a> {
    pub key: &'static str,
    pub value: &'a Value,
    pub readonly: bool,
}

/// Persistable copy of every value, keyed by name
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigurationSnapshot {
    pub values: BTreeMap<String, Value>,
}

/// Keyed configuration store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// Parallel to `DEFINITIONS`
    values: Vec<Value>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self {
            values: DEFINITIONS.iter().map(default_value).collect(),
        }
    }

    /// Wrap into the shared handle the engine consumes
    pub fn shared(self) -> SharedConfiguration {
        Arc::new(RwLock::new(self))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn has(&self, key: &str) -> bool {
        position(key).is_some()
    }

    pub fn key_at(&self, index: usize) -> Option<&'static str> {
        DEFINITIONS.get(index).map(|d| d.key)
    }

    pub fn value_type(&self, key: &str) -> Result<ValueType> {
        Ok(definition(key)?.1.kind)
    }

    /// Unknown keys are neither readable nor writable
    pub fn is_readable(&self, key: &str) -> bool {
        definition(key).is_ok_and(|(_, d)| d.access.readable())
    }

    pub fn is_writable(&self, key: &str) -> bool {
        definition(key).is_ok_and(|(_, d)| d.access.writable())
    }

    pub fn get(&self, key: &str) -> Result<&Value> {
        let (index, _) = definition(key)?;
        Ok(&self.values[index])
    }

    pub fn get_int(&self, key: &str) -> Result<i32> {
        match self.get(key)? {
            Value::Int(v) => Ok(*v),
            _ => Err(mismatch(key, ValueType::Int)),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        match self.get(key)? {
            Value::Bool(v) => Ok(*v),
            _ => Err(mismatch(key, ValueType::Bool)),
        }
    }

    pub fn get_by_index(&self, index: usize) -> Option<ConfigEntry<'_>> {
        let d = DEFINITIONS.get(index)?;
        Some(ConfigEntry {
            key: d.key,
            value: &self.values[index],
            readonly: !d.access.writable(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = ConfigEntry<'_>> {
        (0..self.len()).filter_map(|i| self.get_by_index(i))
    }

    /// Store a typed value, honouring access rights
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let (index, d) = definition(key)?;
        if !d.access.writable() {
            return Err(ConfigurationError::ReadOnly(key.to_string()));
        }
        check(d, &value)?;

        debug!("Configuration {} = {:?}", key, value);
        self.values[index] = value;
        Ok(())
    }

    /// Parse the textual form (as sent in `ChangeConfiguration`) and store it
    pub fn set_from_str(&mut self, key: &str, text: &str) -> Result<()> {
        let (_, d) = definition(key)?;
        let value = parse(d, text)?;
        self.set(key, value)
    }

    /// Textual form of a value, CSL masks rendered as names
    pub fn stringify(&self, key: &str) -> Result<String> {
        let (index, d) = definition(key)?;
        Ok(render(d.kind, &self.values[index]))
    }

    /// Restore every key to its default
    pub fn reset(&mut self) {
        self.values = DEFINITIONS.iter().map(default_value).collect();
    }

    pub fn snapshot(&self) -> ConfigurationSnapshot {
        let values = DEFINITIONS
            .iter()
            .zip(&self.values)
            .map(|(d, v)| (d.key.to_string(), v.clone()))
            .collect();
        ConfigurationSnapshot { values }
    }

    /// Load persisted values. Read-only keys are restored too; the whole
    /// snapshot is validated before anything is written.
    pub fn restore(&mut self, snapshot: &ConfigurationSnapshot) -> Result<()> {
        let mut staged = Vec::with_capacity(snapshot.values.len());
        for (key, value) in &snapshot.values {
            let (index, d) = definition(key)?;
            check(d, value)?;
            staged.push((index, value.clone()));
        }

        for (index, value) in staged {
            self.values[index] = value;
        }
        Ok(())
    }
}

fn position(key: &str) -> Option<usize> {
    DEFINITIONS.iter().position(|d| d.key == key)
}

fn definition(key: &str) -> Result<(usize, &'static Definition)> {
    position(key)
        .map(|index| (index, &DEFINITIONS[index]))
        .ok_or_else(|| ConfigurationError::UnknownKey(key.to_string()))
}

fn mismatch(key: &str, expected: ValueType) -> ConfigurationError {
    ConfigurationError::TypeMismatch {
        key: key.to_string(),
        expected,
    }
}

fn check(d: &Definition, value: &Value) -> Result<()> {
    if !value.matches(d.kind) {
        return Err(mismatch(d.key, d.kind));
    }
    match (value, d.kind) {
        (Value::Str(s), ValueType::Str(max)) if s.len() > max => {
            Err(ConfigurationError::ValueTooLarge {
                key: d.key.to_string(),
                max,
            })
        }
        (Value::Csl(index), ValueType::Csl(CslKind::PhaseRotation))
            if PhaseRotation::from_index(*index).is_none() =>
        {
            Err(ConfigurationError::InvalidValue {
                key: d.key.to_string(),
                value: index.to_string(),
            })
        }
        _ => Ok(()),
    }
}

fn parse(d: &Definition, text: &str) -> Result<Value> {
    let invalid = || ConfigurationError::InvalidValue {
        key: d.key.to_string(),
        value: text.to_string(),
    };
    let text = text.trim();

    let value = match d.kind {
        ValueType::Int => Value::Int(text.parse().map_err(|_| invalid())?),
        ValueType::Bool => match text.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(invalid()),
        },
        ValueType::Str(_) => Value::Str(text.to_string()),
        ValueType::Csl(kind) => Value::Csl(parse_csl(kind, text).ok_or_else(invalid)?),
    };
    Ok(value)
}

fn parse_csl(kind: CslKind, text: &str) -> Option<u32> {
    match kind {
        CslKind::Measurands => parse_flags::<Measurand>(text).ok(),
        CslKind::FeatureProfiles => parse_flags::<FeatureProfile>(text).ok(),
        CslKind::ChargingRateUnits => parse_flags::<ChargingRateUnit>(text).ok(),
        CslKind::PhaseRotation => {
            let rotation: PhaseRotation = text.parse().ok()?;
            PhaseRotation::ALL
                .iter()
                .position(|p| *p == rotation)
                .map(|i| i as u32)
        }
    }
}

fn render(kind: ValueType, value: &Value) -> String {
    match (kind, value) {
        (_, Value::Int(v)) => v.to_string(),
        (_, Value::Bool(v)) => v.to_string(),
        (_, Value::Str(v)) => v.clone(),
        (ValueType::Csl(kind), Value::Csl(mask)) => match kind {
            CslKind::Measurands => join_flags::<Measurand>(*mask),
            CslKind::FeatureProfiles => join_flags::<FeatureProfile>(*mask),
            CslKind::ChargingRateUnits => join_flags::<ChargingRateUnit>(*mask),
            CslKind::PhaseRotation => PhaseRotation::from_index(*mask)
                .map(|p| p.as_str().to_string())
                .unwrap_or_default(),
        },
        (_, Value::Csl(mask)) => mask.to_string(),
    }
}

fn default_value(d: &Definition) -> Value {
    parse(d, d.default).unwrap_or_else(|e| {
        error!("Bad default for {}: {}", d.key, e);
        Value::empty(d.kind)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CslFlag;

    #[test]
    fn test_defaults_parse() {
        for d in DEFINITIONS {
            assert!(parse(d, d.default).is_ok(), "default of {}", d.key);
        }
    }

    #[test]
    fn test_keys_are_unique() {
        for (i, d) in DEFINITIONS.iter().enumerate() {
            assert_eq!(position(d.key), Some(i), "duplicate {}", d.key);
        }
    }

    #[test]
    fn test_engine_keys() {
        let config = Configuration::new();
        assert_eq!(config.get_int(HEARTBEAT_INTERVAL), Ok(60));
        assert_eq!(config.get_int(TRANSACTION_MESSAGE_ATTEMPTS), Ok(3));
        assert_eq!(config.get_int(TRANSACTION_MESSAGE_RETRY_INTERVAL), Ok(60));
        assert_eq!(config.get_int("NumberOfConnectors"), Ok(1));
    }

    #[test]
    fn test_set_errors() {
        let mut config = Configuration::new();

        assert_eq!(
            config.set("NoSuchKey", Value::Int(1)),
            Err(ConfigurationError::UnknownKey("NoSuchKey".into()))
        );
        assert_eq!(
            config.set("NumberOfConnectors", Value::Int(2)),
            Err(ConfigurationError::ReadOnly("NumberOfConnectors".into()))
        );
        assert!(matches!(
            config.set(HEARTBEAT_INTERVAL, Value::Bool(true)),
            Err(ConfigurationError::TypeMismatch { .. })
        ));
        assert!(matches!(
            config.set("CpoName", Value::Str("x".repeat(51))),
            Err(ConfigurationError::ValueTooLarge { max: 50, .. })
        ));
        assert!(config.set("CpoName", Value::Str("x".repeat(50))).is_ok());
    }

    #[test]
    fn test_access_rights() {
        let config = Configuration::new();
        assert!(config.is_readable("NumberOfConnectors"));
        assert!(!config.is_writable("NumberOfConnectors"));
        assert!(!config.is_readable("AuthorizationKey"));
        assert!(config.is_writable("AuthorizationKey"));
        assert!(!config.is_readable("NoSuchKey"));
    }

    #[test]
    fn test_set_from_str() {
        let mut config = Configuration::new();

        config.set_from_str(HEARTBEAT_INTERVAL, "300").unwrap();
        assert_eq!(config.get_int(HEARTBEAT_INTERVAL), Ok(300));

        config.set_from_str("LocalPreAuthorize", "TRUE").unwrap();
        assert_eq!(config.get_bool("LocalPreAuthorize"), Ok(true));

        config
            .set_from_str("MeterValuesSampledData", "Voltage, Current.Import")
            .unwrap();
        assert_eq!(
            config.get("MeterValuesSampledData"),
            Ok(&Value::Csl(
                Measurand::Voltage.bit() | Measurand::CurrentImport.bit()
            ))
        );

        assert!(matches!(
            config.set_from_str(HEARTBEAT_INTERVAL, "soon"),
            Err(ConfigurationError::InvalidValue { .. })
        ));
        assert!(config.set_from_str("MeterValuesSampledData", "Bogus").is_err());
    }

    #[test]
    fn test_stringify_csl() {
        let mut config = Configuration::new();
        assert_eq!(
            config.stringify("MeterValuesSampledData").unwrap(),
            "Energy.Active.Import.Register"
        );
        assert_eq!(config.stringify("SupportedFeatureProfiles").unwrap(), "Core");
        assert_eq!(config.stringify("ConnectorPhaseRotation").unwrap(), "NotApplicable");

        config.set_from_str("ConnectorPhaseRotation", "RST").unwrap();
        assert_eq!(config.get("ConnectorPhaseRotation"), Ok(&Value::Csl(2)));
        assert_eq!(config.stringify("ConnectorPhaseRotation").unwrap(), "RST");
        assert_eq!(config.stringify("StopTxnSampledData").unwrap(), "");
    }

    #[test]
    fn test_index_access() {
        let config = Configuration::new();
        assert_eq!(config.key_at(0), Some("AllowOfflineTxForUnknownId"));
        assert_eq!(config.key_at(config.len()), None);

        let entry = config
            .iter()
            .find(|e| e.key == "NumberOfConnectors")
            .unwrap();
        assert!(entry.readonly);
        assert_eq!(entry.value, &Value::Int(1));
    }

    #[test]
    fn test_snapshot_restore() {
        let mut config = Configuration::new();
        config.set_from_str(HEARTBEAT_INTERVAL, "900").unwrap();
        let snapshot = config.snapshot();

        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: ConfigurationSnapshot = serde_json::from_str(&json).unwrap();

        let mut restored = Configuration::new();
        restored.restore(&decoded).unwrap();
        assert_eq!(restored, config);

        config.reset();
        assert_eq!(config.get_int(HEARTBEAT_INTERVAL), Ok(60));
    }

    #[test]
    fn test_restore_is_all_or_nothing() {
        let mut config = Configuration::new();
        let mut snapshot = ConfigurationSnapshot::default();
        snapshot
            .values
            .insert(HEARTBEAT_INTERVAL.to_string(), Value::Int(5));
        snapshot
            .values
            .insert("NoSuchKey".to_string(), Value::Int(5));

        assert!(config.restore(&snapshot).is_err());
        assert_eq!(config.get_int(HEARTBEAT_INTERVAL), Ok(60));
    }
}
