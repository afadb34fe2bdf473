//! Test support utilities - only compiled in test builds.

extern crate std;

use std::boxed::Box;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::vec::Vec;

use crate::pac::{Reg, RegisterBlock, Sr};
use crate::spi::{Callback, ConfigField, RawConfig, Registry};

/// One observed register access.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Access {
    Read(Reg),
    Write(Reg, u32),
}

struct Inner {
    cr1: u32,
    cr2: u32,
    /// Status bits other than TXE/RXNE.
    status: u32,
    tx_stalled: bool,
    rx: VecDeque<u16>,
    log: Vec<Access>,
}

/// Register spy: records every access and models TXE/RXNE.
///
/// TXE reads as set unless stalled. RXNE reads as set while words are queued
/// for reception; reading DR pops the queue (0 once it is empty).
pub struct MockRegisters {
    inner: Mutex<Inner>,
}

impl MockRegisters {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                cr1: 0,
                cr2: 0,
                status: 0,
                tx_stalled: false,
                rx: VecDeque::new(),
                log: Vec::new(),
            }),
        }
    }

    pub fn with_rx(words: &[u16]) -> Self {
        let mock = Self::new();
        mock.push_rx(words);
        mock
    }

    pub fn leak(self) -> &'static Self {
        Box::leak(Box::new(self))
    }

    pub fn push_rx(&self, words: &[u16]) {
        self.inner.lock().unwrap().rx.extend(words.iter().copied());
    }

    pub fn stall_tx(&self, stalled: bool) {
        self.inner.lock().unwrap().tx_stalled = stalled;
    }

    /// Raise status bits (fault flags, BSY, ...) as the hardware would.
    pub fn raise(&self, f: impl FnOnce(&mut Sr)) {
        let mut inner = self.inner.lock().unwrap();
        let mut sr = Sr(inner.status);
        f(&mut sr);
        inner.status = sr.0;
    }

    pub fn events(&self) -> Vec<Access> {
        self.inner.lock().unwrap().log.clone()
    }

    pub fn clear_log(&self) {
        self.inner.lock().unwrap().log.clear();
    }

    pub fn writes(&self) -> Vec<(Reg, u32)> {
        self.events()
            .into_iter()
            .filter_map(|a| match a {
                Access::Write(reg, v) => Some((reg, v)),
                Access::Read(_) => None,
            })
            .collect()
    }

    pub fn writes_to(&self, reg: Reg) -> Vec<u32> {
        self.writes().into_iter().filter(|(r, _)| *r == reg).map(|(_, v)| v).collect()
    }

    pub fn dr_writes(&self) -> Vec<u16> {
        self.writes_to(Reg::Dr).into_iter().map(|v| v as u16).collect()
    }

    pub fn reads_of(&self, reg: Reg) -> usize {
        self.events().iter().filter(|a| **a == Access::Read(reg)).count()
    }

    pub fn cr1(&self) -> crate::pac::Cr1 {
        crate::pac::Cr1(self.inner.lock().unwrap().cr1)
    }

    pub fn cr2(&self) -> crate::pac::Cr2 {
        crate::pac::Cr2(self.inner.lock().unwrap().cr2)
    }
}

impl RegisterBlock for MockRegisters {
    fn read(&self, reg: Reg) -> u32 {
        let mut inner = self.inner.lock().unwrap();
        inner.log.push(Access::Read(reg));
        match reg {
            Reg::Cr1 => inner.cr1,
            Reg::Cr2 => inner.cr2,
            Reg::Sr => {
                let mut sr = Sr(inner.status);
                sr.set_txe(!inner.tx_stalled);
                sr.set_rxne(!inner.rx.is_empty());
                sr.0
            }
            Reg::Dr => inner.rx.pop_front().unwrap_or(0) as u32,
        }
    }

    fn write(&self, reg: Reg, value: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.log.push(Access::Write(reg, value));
        match reg {
            Reg::Cr1 => inner.cr1 = value,
            Reg::Cr2 => inner.cr2 = value,
            Reg::Sr | Reg::Dr => {}
        }
    }
}

/// A registry backed by four fresh spies, one per instance.
pub fn mock_registry() -> (Registry, [&'static MockRegisters; 4]) {
    let mocks = [
        MockRegisters::new().leak(),
        MockRegisters::new().leak(),
        MockRegisters::new().leak(),
        MockRegisters::new().leak(),
    ];
    let registry = Registry::new([mocks[0], mocks[1], mocks[2], mocks[3]]);
    (registry, mocks)
}

/// Completion callback that counts its invocations.
pub struct CountingCallback {
    count: Mutex<usize>,
}

impl CountingCallback {
    pub fn leak() -> &'static Self {
        Box::leak(Box::new(Self { count: Mutex::new(0) }))
    }

    pub fn count(&self) -> usize {
        *self.count.lock().unwrap()
    }
}

impl Callback for CountingCallback {
    fn on_complete(&self) {
        *self.count.lock().unwrap() += 1;
    }
}

pub fn leak_buf<T: Copy, const N: usize>(data: [T; N]) -> &'static mut [T] {
    Box::leak(Box::new(data))
}

/// One out-of-range value per field, each paired with the field it trips.
pub fn invalid_field_records() -> [(RawConfig, ConfigField); 11] {
    let raw = RawConfig::default;
    [
        (RawConfig { baud_divisor: 8, ..raw() }, ConfigField::BaudDivisor),
        (RawConfig { crc: 2, ..raw() }, ConfigField::Crc),
        (RawConfig { role: 2, ..raw() }, ConfigField::Role),
        (RawConfig { clock_phase: 2, ..raw() }, ConfigField::ClockPhase),
        (RawConfig { clock_polarity: 2, ..raw() }, ConfigField::ClockPolarity),
        (RawConfig { data_width: 2, ..raw() }, ConfigField::DataWidth),
        (RawConfig { bit_order: 2, ..raw() }, ConfigField::BitOrder),
        (RawConfig { slave_management: 1, ..raw() }, ConfigField::SlaveManagement),
        (RawConfig { duplex_mode: 1, ..raw() }, ConfigField::DuplexMode),
        (RawConfig { duplex_mode: 5, ..raw() }, ConfigField::DuplexMode),
        (RawConfig { multi_master: 2, ..raw() }, ConfigField::MultiMaster),
    ]
}
