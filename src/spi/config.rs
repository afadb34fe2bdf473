//! Configuration records and their validation.

use embedded_hal::spi::{Mode, Phase, Polarity};

use super::Error;

/// Number of SPI instances on the chip.
pub const INSTANCE_COUNT: usize = 4;

/// One physical SPI peripheral.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusInstance {
    Spi1 = 1,
    Spi2 = 2,
    Spi3 = 3,
    Spi4 = 4,
}

impl BusInstance {
    pub const ALL: [BusInstance; INSTANCE_COUNT] = [Self::Spi1, Self::Spi2, Self::Spi3, Self::Spi4];

    /// Instance from its 1-based ordinal.
    pub const fn from_ordinal(n: u8) -> Result<Self, Error> {
        match n {
            1 => Ok(Self::Spi1),
            2 => Ok(Self::Spi2),
            3 => Ok(Self::Spi3),
            4 => Ok(Self::Spi4),
            _ => Err(Error::InvalidInstance),
        }
    }

    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    pub(crate) const fn index(self) -> usize {
        self as usize - 1
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Slave = 0,
    Master = 1,
}

/// Line usage. Encodings match the `BIDIMODE:BIDIOE` pair, except simplex.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DuplexMode {
    FullDuplex = 0,
    HalfDuplexReceive = 2,
    HalfDuplexTransmit = 3,
    /// Receive only, on the dedicated `RXONLY` bit.
    SimplexReceive = 4,
}

impl DuplexMode {
    pub const fn is_half_duplex(self) -> bool {
        matches!(self, Self::HalfDuplexReceive | Self::HalfDuplexTransmit)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataWidth {
    Bits8 = 0,
    Bits16 = 1,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    MsbFirst = 0,
    LsbFirst = 1,
}

/// Peripheral clock divisor, `CR1.BR`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BaudDivisor {
    Div2 = 0,
    Div4 = 1,
    Div8 = 2,
    Div16 = 3,
    Div32 = 4,
    Div64 = 5,
    Div128 = 6,
    Div256 = 7,
}

impl BaudDivisor {
    pub const fn divisor(self) -> u32 {
        2 << (self as u32)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockPolarity {
    IdleLow = 0,
    IdleHigh = 1,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockPhase {
    CaptureFirst = 0,
    CaptureSecond = 1,
}

/// Slave select handling. Encodings match the `SSM:SSI` pair.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlaveManagement {
    Hardware = 0,
    SoftwareActive = 2,
    SoftwareInactive = 3,
}

impl SlaveManagement {
    pub const fn is_software(self) -> bool {
        !matches!(self, Self::Hardware)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CrcState {
    Disabled = 0,
    Enabled = 1,
}

/// Multi-master capability, driven through `CR2.SSOE` on a master.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MultiMaster {
    Provided = 0,
    NotProvided = 1,
}

/// Bound applied to every busy-wait on a status flag.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitPolicy {
    /// Spin until the flag is set, however long it takes.
    #[default]
    Forever,
    /// Give up with [`Error::Timeout`] after this many status polls.
    Spins(u32),
}

/// Field of a [`RawConfig`] that failed validation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigField {
    BaudDivisor,
    Crc,
    Role,
    ClockPhase,
    ClockPolarity,
    DataWidth,
    BitOrder,
    SlaveManagement,
    DuplexMode,
    MultiMaster,
}

/// Unchecked configuration record, one raw byte per field.
///
/// `instance` is 1-based. Every other field uses the numeric encoding of the
/// matching typed enum in this module.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawConfig {
    pub instance: u8,
    pub baud_divisor: u8,
    pub clock_polarity: u8,
    pub clock_phase: u8,
    pub duplex_mode: u8,
    pub bit_order: u8,
    pub data_width: u8,
    pub role: u8,
    pub slave_management: u8,
    pub crc: u8,
    pub multi_master: u8,
}

impl Default for RawConfig {
    fn default() -> Self {
        Config::default().into()
    }
}

/// Validated configuration.
#[non_exhaustive]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub instance: BusInstance,
    pub role: Role,
    pub duplex_mode: DuplexMode,
    pub data_width: DataWidth,
    pub bit_order: BitOrder,
    /// Ignored in slave role.
    pub baud_divisor: BaudDivisor,
    pub clock_polarity: ClockPolarity,
    pub clock_phase: ClockPhase,
    pub slave_management: SlaveManagement,
    pub crc: CrcState,
    /// Ignored in slave role.
    pub multi_master: MultiMaster,
    pub wait_policy: WaitPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instance: BusInstance::Spi1,
            role: Role::Master,
            duplex_mode: DuplexMode::FullDuplex,
            data_width: DataWidth::Bits8,
            bit_order: BitOrder::MsbFirst,
            baud_divisor: BaudDivisor::Div8,
            clock_polarity: ClockPolarity::IdleLow,
            clock_phase: ClockPhase::CaptureFirst,
            slave_management: SlaveManagement::SoftwareInactive,
            crc: CrcState::Disabled,
            multi_master: MultiMaster::Provided,
            wait_policy: WaitPolicy::Forever,
        }
    }
}

impl Config {
    pub fn new(instance: BusInstance) -> Self {
        Self {
            instance,
            ..Default::default()
        }
    }

    pub fn with_wait_policy(mut self, wait_policy: WaitPolicy) -> Self {
        self.wait_policy = wait_policy;
        self
    }

    /// Clock polarity and phase as an `embedded-hal` mode.
    pub fn mode(&self) -> Mode {
        Mode {
            polarity: match self.clock_polarity {
                ClockPolarity::IdleLow => Polarity::IdleLow,
                ClockPolarity::IdleHigh => Polarity::IdleHigh,
            },
            phase: match self.clock_phase {
                ClockPhase::CaptureFirst => Phase::CaptureOnFirstTransition,
                ClockPhase::CaptureSecond => Phase::CaptureOnSecondTransition,
            },
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.clock_polarity = match mode.polarity {
            Polarity::IdleLow => ClockPolarity::IdleLow,
            Polarity::IdleHigh => ClockPolarity::IdleHigh,
        };
        self.clock_phase = match mode.phase {
            Phase::CaptureOnFirstTransition => ClockPhase::CaptureFirst,
            Phase::CaptureOnSecondTransition => ClockPhase::CaptureSecond,
        };
    }
}

impl From<Config> for RawConfig {
    fn from(c: Config) -> Self {
        Self {
            instance: c.instance.ordinal(),
            baud_divisor: c.baud_divisor as u8,
            clock_polarity: c.clock_polarity as u8,
            clock_phase: c.clock_phase as u8,
            duplex_mode: c.duplex_mode as u8,
            bit_order: c.bit_order as u8,
            data_width: c.data_width as u8,
            role: c.role as u8,
            slave_management: c.slave_management as u8,
            crc: c.crc as u8,
            multi_master: c.multi_master as u8,
        }
    }
}

impl TryFrom<&RawConfig> for Config {
    type Error = Error;

    fn try_from(raw: &RawConfig) -> Result<Self, Error> {
        validate(Some(raw))
    }
}

/// Check every field of `raw`, in a fixed order, and build the typed record.
///
/// Reports the first violation: a missing record, then the instance, then
/// baud divisor, CRC, role, clock phase, clock polarity, data width, bit order,
/// slave management, duplex mode and multi-master.
pub fn validate(raw: Option<&RawConfig>) -> Result<Config, Error> {
    let raw = raw.ok_or(Error::NullArgument)?;
    let invalid = Error::InvalidConfigField;

    let instance = BusInstance::from_ordinal(raw.instance)?;
    let baud_divisor = match raw.baud_divisor {
        0 => BaudDivisor::Div2,
        1 => BaudDivisor::Div4,
        2 => BaudDivisor::Div8,
        3 => BaudDivisor::Div16,
        4 => BaudDivisor::Div32,
        5 => BaudDivisor::Div64,
        6 => BaudDivisor::Div128,
        7 => BaudDivisor::Div256,
        _ => return Err(invalid(ConfigField::BaudDivisor)),
    };
    let crc = match raw.crc {
        0 => CrcState::Disabled,
        1 => CrcState::Enabled,
        _ => return Err(invalid(ConfigField::Crc)),
    };
    let role = match raw.role {
        0 => Role::Slave,
        1 => Role::Master,
        _ => return Err(invalid(ConfigField::Role)),
    };
    let clock_phase = match raw.clock_phase {
        0 => ClockPhase::CaptureFirst,
        1 => ClockPhase::CaptureSecond,
        _ => return Err(invalid(ConfigField::ClockPhase)),
    };
    let clock_polarity = match raw.clock_polarity {
        0 => ClockPolarity::IdleLow,
        1 => ClockPolarity::IdleHigh,
        _ => return Err(invalid(ConfigField::ClockPolarity)),
    };
    let data_width = match raw.data_width {
        0 => DataWidth::Bits8,
        1 => DataWidth::Bits16,
        _ => return Err(invalid(ConfigField::DataWidth)),
    };
    let bit_order = match raw.bit_order {
        0 => BitOrder::MsbFirst,
        1 => BitOrder::LsbFirst,
        _ => return Err(invalid(ConfigField::BitOrder)),
    };
    let slave_management = match raw.slave_management {
        0 => SlaveManagement::Hardware,
        2 => SlaveManagement::SoftwareActive,
        3 => SlaveManagement::SoftwareInactive,
        _ => return Err(invalid(ConfigField::SlaveManagement)),
    };
    let duplex_mode = match raw.duplex_mode {
        0 => DuplexMode::FullDuplex,
        2 => DuplexMode::HalfDuplexReceive,
        3 => DuplexMode::HalfDuplexTransmit,
        4 => DuplexMode::SimplexReceive,
        _ => return Err(invalid(ConfigField::DuplexMode)),
    };
    let multi_master = match raw.multi_master {
        0 => MultiMaster::Provided,
        1 => MultiMaster::NotProvided,
        _ => return Err(invalid(ConfigField::MultiMaster)),
    };

    Ok(Config {
        instance,
        role,
        duplex_mode,
        data_width,
        bit_order,
        baud_divisor,
        clock_polarity,
        clock_phase,
        slave_management,
        crc,
        multi_master,
        wait_policy: WaitPolicy::Forever,
    })
}
