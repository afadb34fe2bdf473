//! Register access for the SPI peripheral block.
//!
//! The driver never touches memory directly: every access goes through a
//! [`RegisterBlock`], so the same code runs against [`Mmio`] on the chip and
//! against a recording double on the host.
//!
//! Field accessors follow the generated-PAC shape: `regs.cr1().modify(|w| w.set_cpol(true))`
//! is exactly one read followed by exactly one write.

use core::marker::PhantomData;

/// Base address of SPI1 (APB2).
pub const SPI1_BASE: usize = 0x4001_3000;
/// Base address of SPI2 (APB1).
pub const SPI2_BASE: usize = 0x4000_3800;
/// Base address of SPI3 (APB1).
pub const SPI3_BASE: usize = 0x4000_3C00;
/// Base address of SPI4 (APB2).
pub const SPI4_BASE: usize = 0x4001_3400;

/// Registers of one SPI block used by the driver.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    /// Control register 1
    Cr1,
    /// Control register 2
    Cr2,
    /// Status register
    Sr,
    /// Data register
    Dr,
}

impl Reg {
    pub const fn offset(self) -> usize {
        match self {
            Reg::Cr1 => 0x00,
            Reg::Cr2 => 0x04,
            Reg::Sr => 0x08,
            Reg::Dr => 0x0C,
        }
    }
}

/// Raw 32-bit access to one SPI register block.
pub trait RegisterBlock: Sync {
    fn read(&self, reg: Reg) -> u32;
    fn write(&self, reg: Reg, value: u32);
}

/// Memory-mapped register block.
pub struct Mmio {
    base: usize,
}

impl Mmio {
    /// # Safety
    ///
    /// `base` must be the address of an SPI register block, and nothing else may
    /// drive that block while this value is in use.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }
}

impl RegisterBlock for Mmio {
    #[inline]
    fn read(&self, reg: Reg) -> u32 {
        unsafe { core::ptr::read_volatile((self.base + reg.offset()) as *const u32) }
    }

    #[inline]
    fn write(&self, reg: Reg, value: u32) {
        unsafe { core::ptr::write_volatile((self.base + reg.offset()) as *mut u32, value) }
    }
}

/// A register value type tied to one [`Reg`].
pub trait RegValue: Copy + Default {
    const REG: Reg;

    fn from_bits(bits: u32) -> Self;
    fn bits(self) -> u32;
}

/// Handle to one register of a block.
pub struct Register<'a, V> {
    block: &'a dyn RegisterBlock,
    _value: PhantomData<V>,
}

impl<'a, V: RegValue> Register<'a, V> {
    #[inline]
    pub fn read(&self) -> V {
        V::from_bits(self.block.read(V::REG))
    }

    /// Write a value built from the reset value (all zero).
    #[inline]
    pub fn write<R>(&self, f: impl FnOnce(&mut V) -> R) -> R {
        let mut v = V::default();
        let r = f(&mut v);
        self.block.write(V::REG, v.bits());
        r
    }

    /// Read-modify-write.
    #[inline]
    pub fn modify<R>(&self, f: impl FnOnce(&mut V) -> R) -> R {
        let mut v = self.read();
        let r = f(&mut v);
        self.block.write(V::REG, v.bits());
        r
    }
}

/// Typed view over a [`RegisterBlock`].
#[derive(Clone, Copy)]
pub struct Regs<'a> {
    block: &'a dyn RegisterBlock,
}

impl<'a> Regs<'a> {
    pub fn new(block: &'a dyn RegisterBlock) -> Self {
        Self { block }
    }

    #[inline]
    pub fn cr1(self) -> Register<'a, Cr1> {
        self.register()
    }

    #[inline]
    pub fn cr2(self) -> Register<'a, Cr2> {
        self.register()
    }

    #[inline]
    pub fn sr(self) -> Register<'a, Sr> {
        self.register()
    }

    #[inline]
    pub fn dr(self) -> Register<'a, Dr> {
        self.register()
    }

    fn register<V: RegValue>(self) -> Register<'a, V> {
        Register {
            block: self.block,
            _value: PhantomData,
        }
    }
}

macro_rules! reg_value {
    ($name:ident, $reg:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub struct $name(pub u32);

        impl RegValue for $name {
            const REG: Reg = $reg;

            #[inline(always)]
            fn from_bits(bits: u32) -> Self {
                Self(bits)
            }

            #[inline(always)]
            fn bits(self) -> u32 {
                self.0
            }
        }
    };
}

macro_rules! bit {
    ($(#[$doc:meta])* $get:ident, $set:ident, $offs:expr) => {
        $(#[$doc])*
        #[inline(always)]
        pub const fn $get(&self) -> bool {
            (self.0 >> $offs) & 0x01 != 0
        }

        $(#[$doc])*
        #[inline(always)]
        pub fn $set(&mut self, val: bool) {
            self.0 = (self.0 & !(0x01 << $offs)) | (((val as u32) & 0x01) << $offs);
        }
    };
}

macro_rules! field {
    ($(#[$doc:meta])* $get:ident, $set:ident, $offs:expr, $mask:expr) => {
        $(#[$doc])*
        #[inline(always)]
        pub const fn $get(&self) -> u8 {
            ((self.0 >> $offs) & $mask) as u8
        }

        $(#[$doc])*
        #[inline(always)]
        pub fn $set(&mut self, val: u8) {
            self.0 = (self.0 & !($mask << $offs)) | (((val as u32) & $mask) << $offs);
        }
    };
}

reg_value!(Cr1, Reg::Cr1);
reg_value!(Cr2, Reg::Cr2);
reg_value!(Sr, Reg::Sr);
reg_value!(Dr, Reg::Dr);

impl Cr1 {
    bit!(/// Clock phase
        cpha, set_cpha, 0);
    bit!(/// Clock polarity
        cpol, set_cpol, 1);
    bit!(/// Master selection
        mstr, set_mstr, 2);
    field!(/// Baud rate control
        br, set_br, 3, 0b111);
    bit!(/// SPI enable
        spe, set_spe, 6);
    bit!(/// Frame format
        lsbfirst, set_lsbfirst, 7);
    bit!(/// Internal slave select
        ssi, set_ssi, 8);
    bit!(/// Software slave management
        ssm, set_ssm, 9);
    bit!(/// Receive only
        rxonly, set_rxonly, 10);
    bit!(/// Data frame format, 16-bit when set
        dff, set_dff, 11);
    bit!(/// Hardware CRC calculation enable
        crcen, set_crcen, 13);
    bit!(/// Output enable in bidirectional mode
        bidioe, set_bidioe, 14);
    bit!(/// Bidirectional data mode enable
        bidimode, set_bidimode, 15);
}

impl Cr2 {
    bit!(/// Rx buffer DMA enable
        rxdmaen, set_rxdmaen, 0);
    bit!(/// Tx buffer DMA enable
        txdmaen, set_txdmaen, 1);
    bit!(/// SS output enable
        ssoe, set_ssoe, 2);
    bit!(/// Error interrupt enable
        errie, set_errie, 5);
    bit!(/// RX buffer not empty interrupt enable
        rxneie, set_rxneie, 6);
    bit!(/// Tx buffer empty interrupt enable
        txeie, set_txeie, 7);
}

impl Sr {
    bit!(/// Receive buffer not empty
        rxne, set_rxne, 0);
    bit!(/// Transmit buffer empty
        txe, set_txe, 1);
    bit!(/// Channel side
        chside, set_chside, 2);
    bit!(/// Underrun flag
        udr, set_udr, 3);
    bit!(/// CRC error flag
        crcerr, set_crcerr, 4);
    bit!(/// Mode fault
        modf, set_modf, 5);
    bit!(/// Overrun flag
        ovr, set_ovr, 6);
    bit!(/// Busy flag
        bsy, set_bsy, 7);
    bit!(/// TI frame format error
        fre, set_fre, 8);

    /// Any fault the error interrupt reports.
    pub const fn has_fault(&self) -> bool {
        self.ovr() || self.modf() || self.crcerr()
    }
}

impl Dr {
    /// Data word, 8 or 16 bits depending on `DFF`.
    #[inline(always)]
    pub const fn data(&self) -> u16 {
        self.0 as u16
    }

    #[inline(always)]
    pub fn set_data(&mut self, val: u16) {
        self.0 = val as u32;
    }
}
