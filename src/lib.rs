#![cfg_attr(not(test), no_std)]
//! Interrupt-driven SPI driver for STM32F4-class serial peripherals.
//!
//! The crate covers configuration validation, register programming, polled
//! transfers and an interrupt-driven transfer engine that completes through a
//! user callback. Clock gating, pin muxing and NVIC setup are left to the
//! application.
//!
//! ```ignore
//! use spi_engine_hal::pac::{Mmio, SPI1_BASE, SPI2_BASE, SPI3_BASE, SPI4_BASE};
//! use spi_engine_hal::spi::{RawConfig, Registry};
//!
//! static SPI1_REGS: Mmio = unsafe { Mmio::new(SPI1_BASE) };
//! // ...
//! static SPI: Registry = Registry::new([&SPI1_REGS, &SPI2_REGS, &SPI3_REGS, &SPI4_REGS]);
//!
//! spi_engine_hal::bind_interrupts!(SPI => {
//!     SPI1 => Spi1;
//! });
//!
//! let config = SPI.init(Some(&RawConfig::default()))?;
//! SPI.transmit(&config, &[0x12u8, 0x34])?;
//! ```

// This must go FIRST so that all the other modules see its macros.
mod macros;

pub mod pac;
pub mod spi;

#[cfg(test)]
mod test_support;
