//! SPI, Serial Peripheral Interface

/*
Supports full-duplex synchronous serial mode
Supports single-wire half-duplex mode and receive-only simplex mode
Supports master and slave modes
Supports 8-bit or 16-bit data frames
Clock frequency is the peripheral clock divided by 2 up to 256
Data order supports MSB or LSB first
Supports hardware or software control of the NSS pin
Transmission and reception support hardware CRC check
Transmission and reception buffers support DMA requests
Interrupt-driven transfers advance one word per interrupt entry
*/

use core::fmt;

mod blocking;
pub mod config;
mod engine;
mod mode;
mod registry;
#[cfg(feature = "embassy")]
mod signal;
mod word;

pub use config::{
    validate, BaudDivisor, BitOrder, BusInstance, ClockPhase, ClockPolarity, Config, ConfigField, CrcState, DataWidth,
    DuplexMode, MultiMaster, RawConfig, Role, SlaveManagement, WaitPolicy, INSTANCE_COUNT,
};
pub use engine::{InterruptKind, TransferSource, TransferState};
pub use registry::Registry;
#[cfg(feature = "embassy")]
pub use signal::CompletionSignal;
pub use word::Word;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A required argument was absent.
    NullArgument,
    /// Instance ordinal outside `1..=4`.
    InvalidInstance,
    /// A configuration field is out of its domain.
    InvalidConfigField(ConfigField),
    /// Operation not allowed in the configured role.
    InvalidRole,
    /// The instance has never been initialised.
    NotConfigured,
    /// An asynchronous transfer is still outstanding on the instance.
    Busy,
    /// Operation needs a half-duplex bus.
    WrongDuplexMode,
    /// A bounded wait ran out.
    Timeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullArgument => f.write_str("required argument missing"),
            Self::InvalidInstance => f.write_str("invalid bus instance"),
            Self::InvalidConfigField(field) => write!(f, "invalid configuration field: {:?}", field),
            Self::InvalidRole => f.write_str("operation not allowed in this role"),
            Self::NotConfigured => f.write_str("bus not configured"),
            Self::Busy => f.write_str("transfer in progress"),
            Self::WrongDuplexMode => f.write_str("bus is not half duplex"),
            Self::Timeout => f.write_str("timed out"),
        }
    }
}

impl embedded_hal::spi::Error for Error {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        embedded_hal::spi::ErrorKind::Other
    }
}

/// Status flags readable through [`Registry::read_flag`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Flag {
    RxNotEmpty,
    TxEmpty,
    ChannelSide,
    Underrun,
    CrcError,
    ModeFault,
    Overrun,
    Busy,
    FrameError,
}

impl Flag {
    pub(crate) fn is_set(self, sr: crate::pac::Sr) -> bool {
        match self {
            Flag::RxNotEmpty => sr.rxne(),
            Flag::TxEmpty => sr.txe(),
            Flag::ChannelSide => sr.chside(),
            Flag::Underrun => sr.udr(),
            Flag::CrcError => sr.crcerr(),
            Flag::ModeFault => sr.modf(),
            Flag::Overrun => sr.ovr(),
            Flag::Busy => sr.bsy(),
            Flag::FrameError => sr.fre(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlagStatus {
    Reset,
    Set,
}

impl From<bool> for FlagStatus {
    fn from(set: bool) -> Self {
        if set {
            FlagStatus::Set
        } else {
            FlagStatus::Reset
        }
    }
}

/// DMA request lines of one instance.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaLine {
    Tx,
    Rx,
}

/// Level of the internal NSS signal under software slave management.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlaveSelect {
    /// NSS driven low, the slave takes part in transfers.
    Activated,
    Deactivated,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HalfDuplexDirection {
    Transmit,
    Receive,
}

/// Completion callback for interrupt-driven transfers.
///
/// Runs in interrupt context, after the driver has released its lock, so it may
/// arm the next transfer.
pub trait Callback: Sync {
    fn on_complete(&self);
}

impl<F: Fn() + Sync> Callback for F {
    fn on_complete(&self) {
        self()
    }
}

/// Blocking SPI driver bound to one configured instance.
pub struct Spi<'r> {
    registry: &'r Registry,
    config: Config,
}

impl<'r> Spi<'r> {
    /// Validate `config`, program the instance and return a driver for it.
    pub fn new(registry: &'r Registry, config: Option<&RawConfig>) -> Result<Self, Error> {
        let config = registry.init(config)?;
        Ok(Self { registry, config })
    }

    pub fn new_with_config(registry: &'r Registry, config: Config) -> Result<Self, Error> {
        registry.apply(&config)?;
        Ok(Self { registry, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn instance(&self) -> BusInstance {
        self.config.instance
    }

    /// Blocking write, received words are discarded.
    pub fn blocking_write<W: Word>(&mut self, words: &[W]) -> Result<(), Error> {
        self.registry.transceive_buffer(&self.config, None, Some(words))
    }

    /// Blocking read, clocking out sentinel words.
    pub fn blocking_read<W: Word>(&mut self, words: &mut [W]) -> Result<(), Error> {
        self.registry.transceive_buffer(&self.config, Some(words), None)
    }

    /// Blocking bidirectional transfer.
    ///
    /// The transfer runs for `max(read.len(), write.len())` words. If `write` is
    /// shorter it is padded with sentinel words.
    pub fn blocking_transfer<W: Word>(&mut self, read: &mut [W], write: &[W]) -> Result<(), Error> {
        self.registry.transceive_buffer(&self.config, Some(read), Some(write))
    }

    pub fn blocking_transfer_in_place<W: Word>(&mut self, words: &mut [W]) -> Result<(), Error> {
        for word in words.iter_mut() {
            let out = *word;
            self.registry.transceive_word(&self.config, Some(out), Some(word))?;
        }
        Ok(())
    }

    /// Wait until the bus has shifted out the last word.
    pub fn blocking_flush(&mut self) -> Result<(), Error> {
        self.registry.wait_until_idle(&self.config)
    }
}

impl<'r> embedded_hal::spi::ErrorType for Spi<'r> {
    type Error = Error;
}

impl<'r, W: Word> embedded_hal::spi::SpiBus<W> for Spi<'r> {
    fn flush(&mut self) -> Result<(), Self::Error> {
        self.blocking_flush()
    }

    fn read(&mut self, words: &mut [W]) -> Result<(), Self::Error> {
        self.blocking_read(words)
    }

    fn write(&mut self, words: &[W]) -> Result<(), Self::Error> {
        self.blocking_write(words)
    }

    fn transfer(&mut self, read: &mut [W], write: &[W]) -> Result<(), Self::Error> {
        self.blocking_transfer(read, write)
    }

    fn transfer_in_place(&mut self, words: &mut [W]) -> Result<(), Self::Error> {
        self.blocking_transfer_in_place(words)
    }
}

impl<'r, W: Word> embedded_hal_nb::spi::FullDuplex<W> for Spi<'r> {
    fn read(&mut self) -> nb::Result<W, Self::Error> {
        self.registry.try_read(self.config.instance)
    }

    fn write(&mut self, word: W) -> nb::Result<(), Self::Error> {
        self.registry.try_write(self.config.instance, word)
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal::spi::SpiBus;
    use embedded_hal_nb::spi::FullDuplex;

    use super::*;
    use crate::pac::Reg;
    use crate::test_support::{mock_registry, Access};

    #[test]
    fn driver_programs_instance_on_construction() {
        let (registry, mocks) = mock_registry();
        let raw = RawConfig {
            instance: 3,
            ..RawConfig::default()
        };
        let spi = Spi::new(&registry, Some(&raw)).unwrap();
        assert_eq!(spi.instance(), BusInstance::Spi3);
        assert!(mocks[2].cr1().spe());
        assert!(mocks[0].events().is_empty());
    }

    #[test]
    fn rejected_config_yields_no_driver() {
        let (registry, mocks) = mock_registry();
        assert_eq!(Spi::new(&registry, None).err(), Some(Error::NullArgument));
        let raw = RawConfig {
            role: 7,
            ..RawConfig::default()
        };
        assert_eq!(
            Spi::new(&registry, Some(&raw)).err(),
            Some(Error::InvalidConfigField(ConfigField::Role))
        );
        assert!(mocks.iter().all(|m| m.writes().is_empty()));
    }

    #[test]
    fn spi_bus_transfer_pads_with_sentinel() {
        let (registry, mocks) = mock_registry();
        let mut spi = Spi::new_with_config(&registry, Config::default()).unwrap();
        mocks[0].push_rx(&[1, 2, 3]);

        let mut read = [0u8; 3];
        SpiBus::transfer(&mut spi, &mut read, &[0x10]).unwrap();
        SpiBus::<u8>::flush(&mut spi).unwrap();

        assert_eq!(read, [1, 2, 3]);
        assert_eq!(mocks[0].dr_writes(), [0x10, 0xFF, 0xFF]);
    }

    #[test]
    fn transfer_in_place_swaps_words() {
        let (registry, mocks) = mock_registry();
        let mut config = Config::default();
        config.data_width = DataWidth::Bits16;
        let mut spi = Spi::new_with_config(&registry, config).unwrap();
        mocks[0].push_rx(&[0xBEEF, 0xCAFE]);

        let mut words = [0x0102u16, 0x0304];
        SpiBus::transfer_in_place(&mut spi, &mut words).unwrap();

        assert_eq!(words, [0xBEEF, 0xCAFE]);
        assert_eq!(mocks[0].dr_writes(), [0x0102, 0x0304]);
    }

    #[test]
    fn full_duplex_would_block_until_flags_allow() {
        let (registry, mocks) = mock_registry();
        let mut spi = Spi::new_with_config(&registry, Config::default()).unwrap();

        assert_eq!(FullDuplex::<u8>::read(&mut spi), Err(nb::Error::WouldBlock));
        mocks[0].stall_tx(true);
        assert_eq!(FullDuplex::write(&mut spi, 0x5Au8), Err(nb::Error::WouldBlock));

        mocks[0].stall_tx(false);
        mocks[0].clear_log();
        FullDuplex::write(&mut spi, 0x5Au8).unwrap();
        mocks[0].push_rx(&[0xA5]);
        assert_eq!(FullDuplex::<u8>::read(&mut spi), Ok(0xA5));
        assert_eq!(
            mocks[0].events(),
            [
                Access::Read(Reg::Sr),
                Access::Write(Reg::Dr, 0x5A),
                Access::Read(Reg::Sr),
                Access::Read(Reg::Dr),
            ]
        );
    }

    #[test]
    fn closures_are_callbacks() {
        static HITS: core::sync::atomic::AtomicUsize = core::sync::atomic::AtomicUsize::new(0);
        let cb = || {
            HITS.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
        };
        Callback::on_complete(&cb);
        assert_eq!(HITS.load(core::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn every_error_is_other_to_embedded_hal() {
        use embedded_hal::spi::Error as _;
        assert_eq!(Error::Busy.kind(), embedded_hal::spi::ErrorKind::Other);
        assert_eq!(
            Error::InvalidConfigField(ConfigField::BaudDivisor).kind(),
            embedded_hal::spi::ErrorKind::Other
        );
    }
}
