//! Word sizes usable for SPI.

/// Type-erased transmit buffer held by a transfer context.
#[derive(Clone, Copy, Debug)]
pub(crate) enum TxBuffer {
    U8(&'static [u8]),
    U16(&'static [u16]),
}

impl TxBuffer {
    pub(crate) fn len(&self) -> usize {
        match self {
            Self::U8(b) => b.len(),
            Self::U16(b) => b.len(),
        }
    }

    pub(crate) fn get(&self, i: usize) -> Option<u16> {
        match self {
            Self::U8(b) => b.get(i).map(|w| *w as u16),
            Self::U16(b) => b.get(i).copied(),
        }
    }
}

/// Type-erased receive buffer held by a transfer context.
#[derive(Debug)]
pub(crate) enum RxBuffer {
    U8(&'static mut [u8]),
    U16(&'static mut [u16]),
}

impl RxBuffer {
    pub(crate) fn len(&self) -> usize {
        match self {
            Self::U8(b) => b.len(),
            Self::U16(b) => b.len(),
        }
    }

    pub(crate) fn set(&mut self, i: usize, word: u16) {
        match self {
            Self::U8(b) => {
                if let Some(w) = b.get_mut(i) {
                    *w = word as u8;
                }
            }
            Self::U16(b) => {
                if let Some(w) = b.get_mut(i) {
                    *w = word;
                }
            }
        }
    }

    pub(crate) fn sentinel(&self) -> u16 {
        match self {
            Self::U8(_) => <u8 as sealed::Word>::SENTINEL,
            Self::U16(_) => <u16 as sealed::Word>::SENTINEL,
        }
    }
}

pub(crate) mod sealed {
    use super::{RxBuffer, TxBuffer};

    pub trait Word: Copy + Default + 'static {
        /// `CR1.DFF` value for this width.
        const DFF: bool;
        /// Filler clocked out when there is nothing to send.
        const SENTINEL: u16;

        fn to_dr(self) -> u16;
        fn from_dr(dr: u16) -> Self;

        fn tx_buffer(buf: &'static [Self]) -> TxBuffer;
        fn rx_buffer(buf: &'static mut [Self]) -> RxBuffer;
        fn from_rx_buffer(buf: RxBuffer) -> Result<&'static mut [Self], RxBuffer>;
    }
}

/// Word sizes usable for SPI.
#[allow(private_bounds)]
pub trait Word: sealed::Word {}

macro_rules! impl_word {
    ($T:ty, $variant:ident, $dff:expr, $sentinel:expr) => {
        impl sealed::Word for $T {
            const DFF: bool = $dff;
            const SENTINEL: u16 = $sentinel;

            #[inline]
            fn to_dr(self) -> u16 {
                self as u16
            }

            #[inline]
            fn from_dr(dr: u16) -> Self {
                dr as $T
            }

            fn tx_buffer(buf: &'static [Self]) -> TxBuffer {
                TxBuffer::$variant(buf)
            }

            fn rx_buffer(buf: &'static mut [Self]) -> RxBuffer {
                RxBuffer::$variant(buf)
            }

            fn from_rx_buffer(buf: RxBuffer) -> Result<&'static mut [Self], RxBuffer> {
                match buf {
                    RxBuffer::$variant(b) => Ok(b),
                    other => Err(other),
                }
            }
        }
        impl Word for $T {}
    };
}

impl_word!(u8, U8, false, 0xFF);
impl_word!(u16, U16, true, 0xFFFF);
