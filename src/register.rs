//! This module defines the registers on the MMPSU v2 and the field catalog used to pack and unpack
//! register values to and from command payloads.
//!
//! Every field travels on the wire as a 5 byte unit: the register number followed by a 4 byte value.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use strum::IntoEnumIterator;
use strum_macros::{EnumIter, EnumString, FromRepr, IntoStaticStr};
use thiserror::Error;

/// Size of an encoded register value.
pub const VALUE_SIZE: usize = 4;
/// Size of a register number followed by its encoded value.
pub const FIELD_UNIT_SIZE: usize = 1 + VALUE_SIZE;

/// Every register of the MMPSU v2.
///
/// Names follow the device documentation, e.g. [`Register::VoutSetpoint`] is `"VOUT_SETPOINT"`.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter, EnumString, IntoStaticStr, FromRepr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Register {
    /// __R/W__ - Enable or disable the output.
    OutputEnabled = 0,
    /// __R__ - Measured output voltage in millivolts.
    VoutMeasured = 1,
    /// __R/W__ - Output voltage setpoint in millivolts.
    VoutSetpoint = 2,
    /// __R__ - Bit-field of the phases inserted on power up.
    PhasesPresent = 3,
    /// __R__ - Bit-field of the phases currently enabled.
    PhasesEnabled = 4,
    /// __R__ - Phase A duty cycle in counts.
    PhaseADutyCycle = 5,
    /// __R__ - Phase A current in milliamps.
    PhaseACurrent = 6,
    /// __R/W__ - Phase A DC current limit in milliamps.
    PhaseACurrentLimit = 7,
    /// __R__ - Phase A approximate temperature in degrees C.
    PhaseATemp = 8,
    PhaseBDutyCycle = 9,
    PhaseBCurrent = 10,
    PhaseBCurrentLimit = 11,
    PhaseBTemp = 12,
    PhaseCDutyCycle = 13,
    PhaseCCurrent = 14,
    PhaseCCurrentLimit = 15,
    PhaseCTemp = 16,
    PhaseDDutyCycle = 17,
    PhaseDCurrent = 18,
    PhaseDCurrentLimit = 19,
    PhaseDTemp = 20,
    PhaseEDutyCycle = 21,
    PhaseECurrent = 22,
    PhaseECurrentLimit = 23,
    PhaseETemp = 24,
    PhaseFDutyCycle = 25,
    PhaseFCurrent = 26,
    PhaseFCurrentLimit = 27,
    PhaseFTemp = 28,
    /// __R__ - Bit-field of the phases in over-temperature.
    PhasesInOvertemp = 29,
    /// __R/W__ - Put the MMPSU into debug mode.
    DebugMode = 30,
    /// __R/W__ - Put the MMPSU into developer mode.
    DeveloperMode = 31,
    /// __R__ - Power system FSM state.
    SystemState = 32,
    /// __R__ - Proportional coefficient of the voltage loop.
    VoltageKp = 33,
    /// __R__ - Integral coefficient of the voltage loop.
    VoltageKi = 34,
    /// __R__ - Proportional coefficient of the current balancing loop.
    CurrentKp = 35,
    /// __R__ - Integral coefficient of the current balancing loop.
    CurrentKi = 36,
    /// __R/W__ - Count of communication link errors seen by the device. Write `0` to reset.
    CommsErrorCount = 37,
    /// __R/W__ - Put the MMPSU into manual control mode.
    ManualMode = 38,
    /// __R/W__ - Number of phases to run while in manual mode.
    PhaseCountRequested = 39,
    /// __R__ - Input voltage.
    VIn = 40,
    /// __R__ - Input current.
    IIn = 41,
    /// __R__ - 12V rail voltage.
    #[strum(serialize = "V_12P0")]
    V12p0 = 42,
    /// __R__ - 12V rail current.
    #[strum(serialize = "I_12P0")]
    I12p0 = 43,
    /// __R__ - 5V rail voltage.
    #[strum(serialize = "V_5P0")]
    V5p0 = 44,
    /// __R__ - 5V rail current.
    #[strum(serialize = "I_5P0")]
    I5p0 = 45,
}

impl Register {
    /// The name of this register as used in field lookups.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// The type of value this register holds.
    pub fn kind(self) -> ValueKind {
        use Register as R;
        match self {
            R::OutputEnabled | R::DeveloperMode | R::ManualMode => ValueKind::Bool,
            R::PhaseATemp
            | R::PhaseBTemp
            | R::PhaseCTemp
            | R::PhaseDTemp
            | R::PhaseETemp
            | R::PhaseFTemp
            | R::VIn
            | R::IIn
            | R::V12p0
            | R::I12p0
            | R::V5p0
            | R::I5p0 => ValueKind::Float32,
            _ => ValueKind::Int32,
        }
    }

    /// Whether the host is allowed to write this register.
    pub fn is_writable(self) -> bool {
        use Register as R;
        matches!(
            self,
            R::OutputEnabled
                | R::VoutSetpoint
                | R::PhaseACurrentLimit
                | R::PhaseBCurrentLimit
                | R::PhaseCCurrentLimit
                | R::PhaseDCurrentLimit
                | R::PhaseECurrentLimit
                | R::PhaseFCurrentLimit
                | R::DebugMode
                | R::DeveloperMode
                | R::CommsErrorCount
                | R::ManualMode
                | R::PhaseCountRequested
        )
    }
}

impl From<Register> for u8 {
    fn from(value: Register) -> Self {
        value as u8
    }
}

/// The encoded type of a register value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValueKind {
    /// Little-endian signed 32 bit integer.
    Int32,
    /// Little-endian IEEE-754 single precision float.
    Float32,
    /// One byte, `0` or `1`, followed by 3 padding bytes.
    Bool,
    /// Raw 4 byte value.
    Bytes,
}

/// A register value. The active variant always matches the [`ValueKind`] of its field.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum RegisterValue {
    Int32(i32),
    Float32(f32),
    Bool(bool),
    Bytes([u8; VALUE_SIZE]),
}

impl RegisterValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int32(_) => ValueKind::Int32,
            Self::Float32(_) => ValueKind::Float32,
            Self::Bool(_) => ValueKind::Bool,
            Self::Bytes(_) => ValueKind::Bytes,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Self::Int32(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Self::Float32(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<[u8; VALUE_SIZE]> {
        match *self {
            Self::Bytes(value) => Some(value),
            _ => None,
        }
    }

    fn encode(&self) -> [u8; VALUE_SIZE] {
        match *self {
            Self::Int32(value) => value.to_le_bytes(),
            Self::Float32(value) => value.to_le_bytes(),
            Self::Bool(value) => [value as u8, 0x00, 0x00, 0x00],
            Self::Bytes(value) => value,
        }
    }

    fn decode(kind: ValueKind, raw: [u8; VALUE_SIZE]) -> Self {
        match kind {
            ValueKind::Int32 => Self::Int32(i32::from_le_bytes(raw)),
            ValueKind::Float32 => Self::Float32(f32::from_le_bytes(raw)),
            // Padding bytes are ignored, any non-zero flag byte reads as true.
            ValueKind::Bool => Self::Bool(raw[0] != 0),
            ValueKind::Bytes => Self::Bytes(raw),
        }
    }
}

impl From<i32> for RegisterValue {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<f32> for RegisterValue {
    fn from(value: f32) -> Self {
        Self::Float32(value)
    }
}

impl From<bool> for RegisterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<[u8; VALUE_SIZE]> for RegisterValue {
    fn from(value: [u8; VALUE_SIZE]) -> Self {
        Self::Bytes(value)
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int32(value) => write!(f, "{value}"),
            Self::Float32(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Bytes(value) => write!(
                f,
                "{:02X} {:02X} {:02X} {:02X}",
                value[0], value[1], value[2], value[3]
            ),
        }
    }
}

/// Errors from looking up, packing or unpacking fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("Unknown field {0:?}")]
    UnknownField(String),
    #[error("Unknown register {0}")]
    UnknownRegister(u8),
    #[error("Field {field} holds {expected:?} values, got {found:?}")]
    TypeMismatch {
        field: &'static str,
        expected: ValueKind,
        found: ValueKind,
    },
    #[error("Buffer too small to pack field")]
    BufferTooSmall,
    #[error("Not enough bytes to unpack field")]
    Truncated,
    #[error("Register {0} is defined more than once")]
    DuplicateRegister(u8),
    #[error("Field {0:?} is defined more than once")]
    DuplicateName(&'static str),
}

/// Describes one field: its name, register number, value type and whether it may be written.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub register: u8,
    pub kind: ValueKind,
    pub writable: bool,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, register: u8, kind: ValueKind, writable: bool) -> Self {
        Self {
            name,
            register,
            kind,
            writable,
        }
    }

    /// Pack the register number then `value` into `dst` at `offset`.
    ///
    /// Returns the number of bytes written, always [`FIELD_UNIT_SIZE`].
    pub fn pack(
        &self,
        value: &RegisterValue,
        dst: &mut [u8],
        offset: usize,
    ) -> Result<usize, FieldError> {
        if value.kind() != self.kind {
            return Err(FieldError::TypeMismatch {
                field: self.name,
                expected: self.kind,
                found: value.kind(),
            });
        }
        let unit = dst
            .get_mut(offset..offset + FIELD_UNIT_SIZE)
            .ok_or(FieldError::BufferTooSmall)?;
        unit[0] = self.register;
        unit[1..].copy_from_slice(&value.encode());
        Ok(FIELD_UNIT_SIZE)
    }

    /// Unpack a value of this field's type from `src`.
    ///
    /// `offset` must point at the value, past the register number.
    pub fn unpack(&self, src: &[u8], offset: usize) -> Result<RegisterValue, FieldError> {
        let mut raw = [0u8; VALUE_SIZE];
        raw.copy_from_slice(
            src.get(offset..offset + VALUE_SIZE)
                .ok_or(FieldError::Truncated)?,
        );
        Ok(RegisterValue::decode(self.kind, raw))
    }
}

impl From<Register> for FieldDescriptor {
    fn from(value: Register) -> Self {
        Self::new(value.name(), value as u8, value.kind(), value.is_writable())
    }
}

/// Table of field descriptors indexed both by name and by register number.
#[derive(Debug, Clone)]
pub struct FieldCatalog {
    fields: Vec<FieldDescriptor>,
    by_name: BTreeMap<&'static str, usize>,
    by_register: [Option<usize>; 256],
}

impl FieldCatalog {
    /// Build a catalog, rejecting duplicate register numbers or names.
    pub fn new(fields: impl IntoIterator<Item = FieldDescriptor>) -> Result<Self, FieldError> {
        let mut catalog = Self::empty();
        for field in fields {
            if catalog.by_register[field.register as usize].is_some() {
                return Err(FieldError::DuplicateRegister(field.register));
            }
            if catalog.by_name.contains_key(field.name) {
                return Err(FieldError::DuplicateName(field.name));
            }
            catalog.push(field);
        }
        Ok(catalog)
    }

    /// The register map of the MMPSU v2.
    pub fn mmpsu_v2() -> &'static FieldCatalog {
        static CATALOG: OnceLock<FieldCatalog> = OnceLock::new();
        CATALOG.get_or_init(|| {
            // Enum discriminants and names are unique, no need to check for duplicates.
            let mut catalog = Self::empty();
            for register in Register::iter() {
                catalog.push(register.into());
            }
            catalog
        })
    }

    fn empty() -> Self {
        Self {
            fields: Vec::new(),
            by_name: BTreeMap::new(),
            by_register: [None; 256],
        }
    }

    fn push(&mut self, field: FieldDescriptor) {
        let index = self.fields.len();
        self.by_name.insert(field.name, index);
        self.by_register[field.register as usize] = Some(index);
        self.fields.push(field);
    }

    pub fn lookup_by_name(&self, name: &str) -> Result<&FieldDescriptor, FieldError> {
        self.by_name
            .get(name)
            .map(|&index| &self.fields[index])
            .ok_or_else(|| FieldError::UnknownField(name.into()))
    }

    pub fn lookup_by_register(&self, register: u8) -> Result<&FieldDescriptor, FieldError> {
        self.by_register[register as usize]
            .map(|index| &self.fields[index])
            .ok_or(FieldError::UnknownRegister(register))
    }

    /// Iterate the descriptors in the order they were defined.
    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
