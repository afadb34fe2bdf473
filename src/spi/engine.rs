//! Interrupt-driven transfer engine.
//!
//! A transfer context is armed from the foreground and then advanced one word
//! per interrupt entry until it observes completion, at which point it disables
//! its own interrupt, drops back to idle and hands the completion callback out
//! to be run once the caller has left the critical section.

use super::config::Role;
use super::word::{RxBuffer, TxBuffer};
use super::Callback;
use crate::pac::Regs;

/// What an armed context is doing.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferSource {
    None,
    Transmit,
    ReceiveAsSlave,
    ReceiveAsMaster,
    /// One caller-chosen word out, one word back.
    TransceiveWord,
}

/// Coarse lifecycle of a transfer context.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferState {
    Idle,
    /// First word or sentinel pushed, no interrupt entry yet.
    Armed,
    InProgress,
}

/// Interrupt kinds a callback can be registered for.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptKind {
    Rx = 0,
    Tx = 1,
    Error = 2,
}

/// Per-instance callbacks, one slot per [`InterruptKind`].
pub(crate) struct CallbackTable {
    slots: [Option<&'static dyn Callback>; 3],
}

impl CallbackTable {
    pub(crate) const fn new() -> Self {
        Self { slots: [None; 3] }
    }

    pub(crate) fn set(&mut self, kind: InterruptKind, callback: Option<&'static dyn Callback>) {
        self.slots[kind as usize] = callback;
    }

    pub(crate) fn get(&self, kind: InterruptKind) -> Option<&'static dyn Callback> {
        self.slots[kind as usize]
    }

    pub(crate) fn take(&mut self, kind: InterruptKind) -> Option<&'static dyn Callback> {
        self.slots[kind as usize].take()
    }
}

#[derive(Clone, Copy, Default)]
struct Counters {
    transmit: usize,
    receive: usize,
}

/// Callbacks due after one interrupt entry.
#[derive(Default)]
#[must_use]
pub(crate) struct Fired {
    pub(crate) error: Option<&'static dyn Callback>,
    pub(crate) complete: Option<&'static dyn Callback>,
}

impl Fired {
    /// Run the callbacks. Must be called outside any critical section.
    pub(crate) fn invoke(self) {
        if let Some(cb) = self.error {
            cb.on_complete();
        }
        if let Some(cb) = self.complete {
            cb.on_complete();
        }
    }
}

/// State of one in-flight asynchronous transfer.
///
/// Master and slave progress are counted separately, and every instance owns
/// its own counters.
pub(crate) struct TransferContext {
    source: TransferSource,
    role: Role,
    tx: Option<TxBuffer>,
    rx: Option<RxBuffer>,
    len: usize,
    master: Counters,
    slave: Counters,
    entered: bool,
    /// Receive buffer of the last finished or aborted receive.
    done_rx: Option<RxBuffer>,
}

impl TransferContext {
    pub(crate) const fn new() -> Self {
        Self {
            source: TransferSource::None,
            role: Role::Master,
            tx: None,
            rx: None,
            len: 0,
            master: Counters { transmit: 0, receive: 0 },
            slave: Counters { transmit: 0, receive: 0 },
            entered: false,
            done_rx: None,
        }
    }

    pub(crate) fn source(&self) -> TransferSource {
        self.source
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.source == TransferSource::None
    }

    pub(crate) fn state(&self) -> TransferState {
        match (self.source, self.entered) {
            (TransferSource::None, _) => TransferState::Idle,
            (_, false) => TransferState::Armed,
            (_, true) => TransferState::InProgress,
        }
    }

    fn counters(&mut self) -> &mut Counters {
        match self.role {
            Role::Master => &mut self.master,
            Role::Slave => &mut self.slave,
        }
    }

    /// Arm a transmit whose first word has already been pushed.
    pub(crate) fn arm_transmit(&mut self, role: Role, buf: TxBuffer) {
        self.role = role;
        self.len = buf.len();
        self.tx = Some(buf);
        self.rx = None;
        self.entered = false;
        self.counters().transmit = 1;
        self.source = TransferSource::Transmit;
    }

    pub(crate) fn arm_receive(&mut self, role: Role, buf: RxBuffer) {
        self.role = role;
        self.len = buf.len();
        self.rx = Some(buf);
        self.tx = None;
        self.entered = false;
        self.counters().receive = 0;
        self.source = match role {
            Role::Slave => TransferSource::ReceiveAsSlave,
            Role::Master => TransferSource::ReceiveAsMaster,
        };
    }

    /// Arm a single-word exchange whose word has already been pushed.
    pub(crate) fn arm_transceive_word(&mut self, role: Role, slot: Option<RxBuffer>) {
        self.role = role;
        self.len = 1;
        self.rx = slot;
        self.tx = None;
        self.entered = false;
        self.source = TransferSource::TransceiveWord;
    }

    /// Drop back to idle. Any receive buffer is parked for the caller.
    pub(crate) fn reset(&mut self) {
        self.source = TransferSource::None;
        self.tx = None;
        if let Some(rx) = self.rx.take() {
            self.done_rx = Some(rx);
        }
        self.len = 0;
        self.entered = false;
    }

    /// A finished receive buffer is still waiting to be taken back.
    ///
    /// No receive may be armed while this holds, or the parked buffer would be
    /// lost.
    pub(crate) fn has_done_rx(&self) -> bool {
        self.done_rx.is_some()
    }

    pub(crate) fn take_done_rx(&mut self) -> Option<RxBuffer> {
        self.done_rx.take()
    }

    pub(crate) fn park_done_rx(&mut self, rx: RxBuffer) {
        self.done_rx = Some(rx);
    }

    /// One interrupt entry.
    pub(crate) fn on_interrupt(&mut self, regs: Regs<'_>, callbacks: &mut CallbackTable) -> Fired {
        let mut fired = Fired::default();

        if let Some(cb) = callbacks.get(InterruptKind::Error) {
            if regs.sr().read().has_fault() {
                fired.error = Some(cb);
            }
        }

        match self.source {
            TransferSource::None => {}
            TransferSource::Transmit => {
                self.entered = true;
                let len = self.len;
                let pos = self.counters().transmit;
                if pos >= len {
                    regs.cr2().modify(|w| w.set_txeie(false));
                    self.reset();
                    fired.complete = callbacks.take(InterruptKind::Tx);
                    trace!("spi: transmit complete, {} words", len);
                } else {
                    let word = self.tx.as_ref().and_then(|b| b.get(pos)).unwrap_or_default();
                    regs.dr().write(|w| w.set_data(word));
                    self.counters().transmit = pos + 1;
                }
            }
            TransferSource::ReceiveAsSlave => {
                self.entered = true;
                let len = self.len;
                let pos = self.counters().receive;
                let word = regs.dr().read().data();
                if let Some(rx) = self.rx.as_mut() {
                    rx.set(pos, word);
                }
                self.counters().receive = pos + 1;
                if pos + 1 >= len {
                    regs.cr2().modify(|w| w.set_rxneie(false));
                    self.reset();
                    fired.complete = callbacks.take(InterruptKind::Rx);
                    trace!("spi: slave receive complete, {} words", len);
                }
            }
            TransferSource::ReceiveAsMaster => {
                self.entered = true;
                let len = self.len;
                let pos = self.counters().receive;
                if pos >= len {
                    regs.cr2().modify(|w| w.set_rxneie(false));
                    self.reset();
                    fired.complete = callbacks.take(InterruptKind::Rx);
                    trace!("spi: master receive complete, {} words", len);
                } else {
                    let sentinel = self.rx.as_ref().map(|b| b.sentinel()).unwrap_or(0xFF);
                    regs.dr().write(|w| w.set_data(sentinel));
                    let word = regs.dr().read().data();
                    if let Some(rx) = self.rx.as_mut() {
                        rx.set(pos, word);
                    }
                    self.counters().receive = pos + 1;
                }
            }
            TransferSource::TransceiveWord => {
                self.entered = true;
                let word = regs.dr().read().data();
                if let Some(slot) = self.rx.as_mut() {
                    slot.set(0, word);
                }
                regs.cr2().modify(|w| w.set_rxneie(false));
                self.reset();
                fired.complete = callbacks.take(InterruptKind::Rx);
                trace!("spi: word exchange complete");
            }
        }

        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pac::Reg;
    use crate::spi::word::sealed::Word as _;
    use crate::test_support::{leak_buf, CountingCallback, MockRegisters};

    fn table_with(kind: InterruptKind, cb: &'static CountingCallback) -> CallbackTable {
        let mut table = CallbackTable::new();
        table.set(kind, Some(cb));
        table
    }

    #[test]
    fn transmit_writes_remaining_words_then_completes() {
        let mock = MockRegisters::new();
        let regs = Regs::new(&mock);
        let cb = CountingCallback::leak();
        let mut table = table_with(InterruptKind::Tx, cb);
        let mut ctx = TransferContext::new();
        static DATA: [u8; 3] = [0xA0, 0xA1, 0xA2];
        ctx.arm_transmit(Role::Master, u8::tx_buffer(&DATA));
        assert_eq!(ctx.state(), TransferState::Armed);

        ctx.on_interrupt(regs, &mut table).invoke();
        assert_eq!(ctx.state(), TransferState::InProgress);
        ctx.on_interrupt(regs, &mut table).invoke();
        assert_eq!(cb.count(), 0);
        ctx.on_interrupt(regs, &mut table).invoke();

        assert_eq!(mock.dr_writes(), [0xA1, 0xA2]);
        assert_eq!(cb.count(), 1);
        assert!(ctx.is_idle());
        assert!(table.get(InterruptKind::Tx).is_none());
    }

    #[test]
    fn idle_entries_do_nothing() {
        let mock = MockRegisters::new();
        let mut table = CallbackTable::new();
        let mut ctx = TransferContext::new();
        ctx.on_interrupt(Regs::new(&mock), &mut table).invoke();
        assert!(mock.events().is_empty());
    }

    #[test]
    fn slave_receive_counts_every_entry() {
        let mock = MockRegisters::with_rx(&[5, 6, 7]);
        let regs = Regs::new(&mock);
        let cb = CountingCallback::leak();
        let mut table = table_with(InterruptKind::Rx, cb);
        let mut ctx = TransferContext::new();
        ctx.arm_receive(Role::Slave, u8::rx_buffer(leak_buf([0u8; 3])));
        assert_eq!(ctx.source(), TransferSource::ReceiveAsSlave);

        for _ in 0..3 {
            ctx.on_interrupt(regs, &mut table).invoke();
        }
        assert_eq!(cb.count(), 1);
        let rx = u8::from_rx_buffer(ctx.take_done_rx().unwrap()).unwrap();
        assert_eq!(rx, [5, 6, 7]);
    }

    #[test]
    fn master_receive_clocks_before_each_read() {
        let mock = MockRegisters::with_rx(&[0x11, 0x22]);
        let regs = Regs::new(&mock);
        let cb = CountingCallback::leak();
        let mut table = table_with(InterruptKind::Rx, cb);
        let mut ctx = TransferContext::new();
        ctx.arm_receive(Role::Master, u8::rx_buffer(leak_buf([0u8; 2])));

        ctx.on_interrupt(regs, &mut table).invoke();
        ctx.on_interrupt(regs, &mut table).invoke();
        assert_eq!(cb.count(), 0);
        ctx.on_interrupt(regs, &mut table).invoke();
        assert_eq!(cb.count(), 1);

        assert_eq!(mock.dr_writes(), [0xFF, 0xFF]);
        assert_eq!(mock.reads_of(Reg::Dr), 2);
    }

    #[test]
    fn master_and_slave_progress_do_not_share_counters() {
        let mock = MockRegisters::with_rx(&[1, 2, 3, 4]);
        let regs = Regs::new(&mock);
        let mut table = CallbackTable::new();
        let mut ctx = TransferContext::new();

        ctx.arm_receive(Role::Master, u8::rx_buffer(leak_buf([0u8; 4])));
        ctx.on_interrupt(regs, &mut table).invoke();
        ctx.reset();
        assert!(ctx.has_done_rx());
        let _ = ctx.take_done_rx();

        // A slave receive armed afterwards starts from its own zero.
        ctx.arm_receive(Role::Slave, u8::rx_buffer(leak_buf([0u8; 2])));
        ctx.on_interrupt(regs, &mut table).invoke();
        ctx.on_interrupt(regs, &mut table).invoke();
        assert!(ctx.is_idle());
        let rx = u8::from_rx_buffer(ctx.take_done_rx().unwrap()).unwrap();
        assert_eq!(rx, [2, 3]);
        assert_eq!(ctx.master.receive, 1);
    }

    #[test]
    fn error_callback_fires_only_on_fault() {
        let mock = MockRegisters::new();
        let regs = Regs::new(&mock);
        let err = CountingCallback::leak();
        let mut table = table_with(InterruptKind::Error, err);
        let mut ctx = TransferContext::new();

        ctx.on_interrupt(regs, &mut table).invoke();
        assert_eq!(err.count(), 0);

        mock.raise(|sr| sr.set_ovr(true));
        ctx.on_interrupt(regs, &mut table).invoke();
        ctx.on_interrupt(regs, &mut table).invoke();
        assert_eq!(err.count(), 2);
        assert!(table.get(InterruptKind::Error).is_some());
    }

    #[test]
    fn word_exchange_completes_on_first_entry() {
        let mock = MockRegisters::with_rx(&[0x3C]);
        let regs = Regs::new(&mock);
        let cb = CountingCallback::leak();
        let mut table = table_with(InterruptKind::Rx, cb);
        let mut ctx = TransferContext::new();

        ctx.arm_transceive_word(Role::Master, Some(u8::rx_buffer(leak_buf([0u8; 1]))));
        assert_eq!(ctx.source(), TransferSource::TransceiveWord);
        ctx.on_interrupt(regs, &mut table).invoke();

        assert_eq!(cb.count(), 1);
        assert!(ctx.is_idle());
        assert!(mock.dr_writes().is_empty());
        assert_eq!(u8::from_rx_buffer(ctx.take_done_rx().unwrap()).unwrap(), [0x3C]);
    }

    #[test]
    fn word_exchange_without_slot_discards_the_reply() {
        let mock = MockRegisters::with_rx(&[0x3C]);
        let cb = CountingCallback::leak();
        let mut table = table_with(InterruptKind::Rx, cb);
        let mut ctx = TransferContext::new();

        ctx.arm_transceive_word(Role::Slave, None);
        ctx.on_interrupt(Regs::new(&mock), &mut table).invoke();

        assert_eq!(cb.count(), 1);
        assert_eq!(mock.reads_of(crate::pac::Reg::Dr), 1);
        assert!(!ctx.has_done_rx());
    }
}
