#![macro_use]
#![allow(unused_macros)]

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "defmt")]
            ::defmt::trace!($s $(, $x)*);
            #[cfg(not(feature = "defmt"))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "defmt")]
            ::defmt::debug!($s $(, $x)*);
            #[cfg(not(feature = "defmt"))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "defmt")]
            ::defmt::warn!($s $(, $x)*);
            #[cfg(not(feature = "defmt"))]
            let _ = ($( & $x ),*);
        }
    };
}

/// Route interrupt vectors to a static [`Registry`](crate::spi::Registry).
///
/// ```ignore
/// static SPI: Registry = Registry::new([&SPI1_REGS, &SPI2_REGS, &SPI3_REGS, &SPI4_REGS]);
///
/// spi_engine_hal::bind_interrupts!(SPI => {
///     SPI1 => Spi1;
///     SPI2 => Spi2;
/// });
/// ```
#[macro_export]
macro_rules! bind_interrupts {
    ($registry:path => { $($irq:ident => $instance:ident;)* }) => {
        $(
            #[allow(non_snake_case)]
            #[no_mangle]
            unsafe extern "C" fn $irq() {
                $registry.on_interrupt($crate::spi::BusInstance::$instance);
            }
        )*
    };
}
