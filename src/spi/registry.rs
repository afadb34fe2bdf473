//! Per-instance state shared between foreground code and interrupt handlers.

use core::cell::RefCell;

use critical_section::Mutex;

use super::config::{validate, BusInstance, Config, DuplexMode, RawConfig, Role, INSTANCE_COUNT};
use super::engine::{CallbackTable, InterruptKind, TransferContext, TransferState};
use super::word::sealed::Word as _;
use super::word::Word;
use super::{mode, Callback, DmaLine, Error, HalfDuplexDirection, SlaveSelect};
use crate::pac::{RegisterBlock, Regs};

struct BusState {
    config: Option<Config>,
    context: TransferContext,
    callbacks: CallbackTable,
}

impl BusState {
    fn check_ready(&self) -> Result<(), Error> {
        if self.config.is_none() {
            return Err(Error::NotConfigured);
        }
        if !self.context.is_idle() {
            return Err(Error::Busy);
        }
        Ok(())
    }

    /// Ready, and no finished receive buffer is waiting to be taken back.
    fn check_receive_ready(&self) -> Result<(), Error> {
        self.check_ready()?;
        if self.context.has_done_rx() {
            return Err(Error::Busy);
        }
        Ok(())
    }
}

struct Bus {
    regs: &'static dyn RegisterBlock,
    state: Mutex<RefCell<BusState>>,
}

impl Bus {
    const fn new(regs: &'static dyn RegisterBlock) -> Self {
        Self {
            regs,
            state: Mutex::new(RefCell::new(BusState {
                config: None,
                context: TransferContext::new(),
                callbacks: CallbackTable::new(),
            })),
        }
    }
}

/// The fixed set of SPI instances, indexed by [`BusInstance`].
///
/// Meant to live in a `static` so that interrupt handlers generated by
/// [`bind_interrupts!`](crate::bind_interrupts) can reach it.
pub struct Registry {
    buses: [Bus; INSTANCE_COUNT],
}

impl Registry {
    pub const fn new(regs: [&'static dyn RegisterBlock; INSTANCE_COUNT]) -> Self {
        Self {
            buses: [
                Bus::new(regs[0]),
                Bus::new(regs[1]),
                Bus::new(regs[2]),
                Bus::new(regs[3]),
            ],
        }
    }

    fn bus(&self, instance: BusInstance) -> &Bus {
        &self.buses[instance.index()]
    }

    pub(crate) fn regs(&self, instance: BusInstance) -> Regs<'_> {
        Regs::new(self.bus(instance).regs)
    }

    fn with_state<R>(&self, instance: BusInstance, f: impl FnOnce(&mut BusState) -> R) -> R {
        critical_section::with(|cs| {
            let mut state = self.bus(instance).state.borrow_ref_mut(cs);
            f(&mut state)
        })
    }

    /// The instance has been configured and has no transfer outstanding.
    pub(crate) fn ensure_ready(&self, instance: BusInstance) -> Result<(), Error> {
        self.with_state(instance, |state| state.check_ready())
    }

    /// Validate a raw record and program the instance it names.
    ///
    /// Nothing is written when validation fails.
    pub fn init(&self, raw: Option<&RawConfig>) -> Result<Config, Error> {
        let config = validate(raw).map_err(|e| {
            warn!("spi: rejected config: {:?}", e);
            e
        })?;
        self.apply(&config)?;
        Ok(config)
    }

    /// Program an already typed configuration.
    pub fn apply(&self, config: &Config) -> Result<(), Error> {
        let regs = self.regs(config.instance);
        self.with_state(config.instance, |state| {
            if !state.context.is_idle() {
                return Err(Error::Busy);
            }
            mode::program(regs, config);
            state.config = Some(*config);
            Ok(())
        })?;
        debug!("spi: SPI{} configured", config.instance.ordinal());
        Ok(())
    }

    /// The configuration last applied to `instance`.
    pub fn config(&self, instance: BusInstance) -> Option<Config> {
        self.with_state(instance, |state| state.config)
    }

    /// Whether `SPE` is set.
    pub fn is_enabled(&self, instance: BusInstance) -> bool {
        self.regs(instance).cr1().read().spe()
    }

    pub fn transfer_state(&self, instance: BusInstance) -> TransferState {
        self.with_state(instance, |state| state.context.state())
    }

    pub fn is_idle(&self, instance: BusInstance) -> bool {
        self.transfer_state(instance) == TransferState::Idle
    }

    /// Interrupt entry for `instance`.
    pub fn on_interrupt(&self, instance: BusInstance) {
        let regs = self.regs(instance);
        let fired = self.with_state(instance, |state| {
            let BusState { context, callbacks, .. } = state;
            context.on_interrupt(regs, callbacks)
        });
        fired.invoke();
    }

    /// Arm an interrupt-driven transmit of `words`.
    ///
    /// The first word is pushed here; every following interrupt entry pushes one
    /// more and the entry after the last word fires `callback`. An empty buffer
    /// completes at once without touching the bus.
    pub fn begin_async_transmit<W: Word>(
        &self,
        config: &Config,
        words: &'static [W],
        callback: &'static dyn Callback,
    ) -> Result<(), Error> {
        let instance = config.instance;
        self.ensure_ready(instance).map_err(|e| {
            warn!("spi: SPI{} transmit rejected: {:?}", instance.ordinal(), e);
            e
        })?;

        let Some(first) = words.first() else {
            callback.on_complete();
            return Ok(());
        };

        let regs = self.regs(instance);
        self.wait_txe(config)?;

        self.with_state(instance, |state| {
            state.check_ready()?;
            state.callbacks.set(InterruptKind::Tx, Some(callback));
            state.context.arm_transmit(config.role, W::tx_buffer(words));
            regs.dr().write(|w| w.set_data(first.to_dr()));
            regs.cr2().modify(|w| w.set_txeie(true));
            Ok(())
        })?;
        trace!("spi: SPI{} transmit armed, {} words", instance.ordinal(), words.len());
        Ok(())
    }

    /// Arm an interrupt-driven receive into `words`.
    ///
    /// A master writes one sentinel word to start the clock. The buffer comes back
    /// through [`finish_receive`](Self::finish_receive) once the callback has fired.
    /// Arming is refused with [`Error::Busy`] while the previous receive buffer has
    /// not been taken back.
    pub fn begin_async_receive<W: Word>(
        &self,
        config: &Config,
        words: &'static mut [W],
        callback: &'static dyn Callback,
    ) -> Result<(), Error> {
        let instance = config.instance;
        let regs = self.regs(instance);
        let len = words.len();

        self.with_state(instance, |state| {
            if let Err(e) = state.check_receive_ready() {
                warn!("spi: SPI{} receive rejected: {:?}", instance.ordinal(), e);
                return Err(e);
            }
            if len == 0 {
                state.context.park_done_rx(W::rx_buffer(words));
                return Ok(false);
            }
            state.callbacks.set(InterruptKind::Rx, Some(callback));
            state.context.arm_receive(config.role, W::rx_buffer(words));
            if config.role == Role::Master {
                regs.dr().write(|w| w.set_data(W::SENTINEL));
            }
            regs.cr2().modify(|w| w.set_rxneie(true));
            Ok(true)
        })
        .map(|armed| {
            if armed {
                trace!("spi: SPI{} receive armed, {} words", instance.ordinal(), len);
            } else {
                callback.on_complete();
            }
        })
    }

    /// Arm an interrupt-driven exchange of one word.
    ///
    /// `send` (or a sentinel) is pushed here and RXNEIE enabled; the next entry
    /// stores the reply into `recv`, if given, and fires `callback`. The slot comes
    /// back through [`finish_receive`](Self::finish_receive) as a one-word buffer.
    pub fn begin_async_transceive_word<W: Word>(
        &self,
        config: &Config,
        send: Option<W>,
        recv: Option<&'static mut W>,
        callback: &'static dyn Callback,
    ) -> Result<(), Error> {
        if send.is_none() && recv.is_none() {
            return Err(Error::NullArgument);
        }
        let instance = config.instance;
        self.with_state(instance, |state| state.check_receive_ready())?;

        let regs = self.regs(instance);
        self.wait_txe(config)?;

        let out = send.map_or(W::SENTINEL, |w| w.to_dr());
        self.with_state(instance, |state| {
            state.check_receive_ready()?;
            state.callbacks.set(InterruptKind::Rx, Some(callback));
            let slot = recv.map(|r| W::rx_buffer(core::slice::from_mut(r)));
            state.context.arm_transceive_word(config.role, slot);
            regs.dr().write(|w| w.set_data(out));
            regs.cr2().modify(|w| w.set_rxneie(true));
            Ok(())
        })?;
        trace!("spi: SPI{} word exchange armed", instance.ordinal());
        Ok(())
    }

    /// Take back the buffer of a finished (or aborted) receive.
    ///
    /// Returns `None` while the receive is still running or if the buffer was of
    /// another word size.
    pub fn finish_receive<W: Word>(&self, instance: BusInstance) -> Option<&'static mut [W]> {
        self.with_state(instance, |state| {
            let rx = state.context.take_done_rx()?;
            match W::from_rx_buffer(rx) {
                Ok(buf) => Some(buf),
                Err(rx) => {
                    state.context.park_done_rx(rx);
                    None
                }
            }
        })
    }

    /// Cancel an outstanding transfer without running its callback.
    ///
    /// Returns `true` if something was cancelled. A receive buffer becomes
    /// available through [`finish_receive`](Self::finish_receive).
    pub fn abort(&self, instance: BusInstance) -> bool {
        let regs = self.regs(instance);
        let aborted = self.with_state(instance, |state| {
            if state.context.is_idle() {
                return false;
            }
            regs.cr2().modify(|w| {
                w.set_txeie(false);
                w.set_rxneie(false);
            });
            state.context.reset();
            let _ = state.callbacks.take(InterruptKind::Tx);
            let _ = state.callbacks.take(InterruptKind::Rx);
            true
        });
        if aborted {
            debug!("spi: SPI{} transfer aborted", instance.ordinal());
        }
        aborted
    }

    /// Register (or clear) the callback run when an interrupt entry sees a fault.
    ///
    /// Also drives `ERRIE`. The callback only reports; flags are left for the
    /// caller to inspect and clear.
    pub fn set_error_callback(&self, instance: BusInstance, callback: Option<&'static dyn Callback>) {
        let regs = self.regs(instance);
        self.with_state(instance, |state| {
            state.callbacks.set(InterruptKind::Error, callback);
            regs.cr2().modify(|w| w.set_errie(callback.is_some()));
        });
    }

    pub fn enable_dma_line(&self, instance: BusInstance, line: DmaLine) {
        self.set_dma_line(instance, line, true)
    }

    pub fn disable_dma_line(&self, instance: BusInstance, line: DmaLine) {
        self.set_dma_line(instance, line, false)
    }

    fn set_dma_line(&self, instance: BusInstance, line: DmaLine, enable: bool) {
        self.regs(instance).cr2().modify(|w| match line {
            DmaLine::Tx => w.set_txdmaen(enable),
            DmaLine::Rx => w.set_rxdmaen(enable),
        });
    }

    /// Drive the internal NSS level of a software-managed slave.
    pub fn set_internal_slave_select(&self, instance: BusInstance, select: SlaveSelect) -> Result<(), Error> {
        let config = self.config(instance).ok_or(Error::NotConfigured)?;
        if config.role != Role::Slave || !config.slave_management.is_software() {
            return Err(Error::InvalidRole);
        }
        self.regs(instance)
            .cr1()
            .modify(|w| w.set_ssi(select == SlaveSelect::Deactivated));
        Ok(())
    }

    /// Turn a half-duplex line around.
    pub fn set_half_duplex_direction(&self, instance: BusInstance, direction: HalfDuplexDirection) -> Result<(), Error> {
        let regs = self.regs(instance);
        self.with_state(instance, |state| {
            let config = state.config.as_mut().ok_or(Error::NotConfigured)?;
            if !config.duplex_mode.is_half_duplex() {
                return Err(Error::WrongDuplexMode);
            }
            let transmit = direction == HalfDuplexDirection::Transmit;
            regs.cr1().modify(|w| w.set_bidioe(transmit));
            config.duplex_mode = if transmit {
                DuplexMode::HalfDuplexTransmit
            } else {
                DuplexMode::HalfDuplexReceive
            };
            Ok(())
        })
    }
}
