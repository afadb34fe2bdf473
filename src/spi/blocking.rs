//! Polled transfers.
//!
//! Every wait spins on a status flag. Under [`WaitPolicy::Forever`] a stuck bus
//! blocks the caller indefinitely; `WaitPolicy::Spins` bounds each wait and
//! reports [`Error::Timeout`].

use super::config::{BusInstance, Config, Role, WaitPolicy};
use super::word::sealed::Word as _;
use super::word::Word;
use super::{Error, Flag, FlagStatus, Registry};
use crate::pac::{Regs, Sr};

/// Spin budget for one wait.
pub(crate) struct Timeout {
    remaining: Option<u32>,
}

impl Timeout {
    pub(crate) fn new(policy: WaitPolicy) -> Self {
        Self {
            remaining: match policy {
                WaitPolicy::Forever => None,
                WaitPolicy::Spins(n) => Some(n),
            },
        }
    }

    /// `None` once the budget is spent.
    #[inline]
    pub(crate) fn check(&mut self) -> Option<()> {
        match &mut self.remaining {
            None => Some(()),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(())
            }
        }
    }
}

fn spin_until(regs: Regs<'_>, policy: WaitPolicy, mut ready: impl FnMut(Sr) -> bool) -> Result<(), Error> {
    let mut timeout = Timeout::new(policy);
    loop {
        if ready(regs.sr().read()) {
            return Ok(());
        }
        timeout.check().ok_or(Error::Timeout)?;
    }
}

fn spin_until_tx_ready(regs: Regs<'_>, policy: WaitPolicy) -> Result<(), Error> {
    spin_until(regs, policy, |sr| sr.txe())
}

fn spin_until_rx_ready(regs: Regs<'_>, policy: WaitPolicy) -> Result<(), Error> {
    spin_until(regs, policy, |sr| sr.rxne())
}

impl Registry {
    pub(crate) fn wait_txe(&self, config: &Config) -> Result<(), Error> {
        spin_until_tx_ready(self.regs(config.instance), config.wait_policy)
    }

    /// Wait for `BSY` to clear.
    pub fn wait_until_idle(&self, config: &Config) -> Result<(), Error> {
        spin_until(self.regs(config.instance), config.wait_policy, |sr| !sr.bsy())
    }

    /// Polled transmit. Received words are left in the data register.
    pub fn transmit<W: Word>(&self, config: &Config, words: &[W]) -> Result<(), Error> {
        self.ensure_ready(config.instance)?;
        let regs = self.regs(config.instance);
        for word in words {
            spin_until_tx_ready(regs, config.wait_policy)?;
            regs.dr().write(|w| w.set_data(word.to_dr()));
        }
        Ok(())
    }

    /// Polled receive.
    ///
    /// A master clocks every word in with a sentinel write; a slave waits for the
    /// remote master.
    pub fn receive<W: Word>(&self, config: &Config, words: &mut [W]) -> Result<(), Error> {
        self.ensure_ready(config.instance)?;
        let regs = self.regs(config.instance);
        for word in words.iter_mut() {
            if config.role == Role::Master {
                regs.dr().write(|w| w.set_data(W::SENTINEL));
            }
            spin_until_rx_ready(regs, config.wait_policy)?;
            *word = W::from_dr(regs.dr().read().data());
        }
        Ok(())
    }

    /// Exchange one word.
    ///
    /// Without `send` a sentinel word is clocked out; without `recv` the received
    /// word is discarded. At least one of the two is required.
    pub fn transceive_word<W: Word>(&self, config: &Config, send: Option<W>, recv: Option<&mut W>) -> Result<(), Error> {
        if send.is_none() && recv.is_none() {
            return Err(Error::NullArgument);
        }
        self.ensure_ready(config.instance)?;
        let word = exchange(self.regs(config.instance), config.wait_policy, send)?;
        if let Some(r) = recv {
            *r = word;
        }
        Ok(())
    }

    /// Exchange `max(recv.len(), send.len())` words.
    ///
    /// A short or missing `send` is padded with sentinel words; received words
    /// beyond `recv` are discarded.
    pub fn transceive_buffer<W: Word>(
        &self,
        config: &Config,
        mut recv: Option<&mut [W]>,
        send: Option<&[W]>,
    ) -> Result<(), Error> {
        if send.is_none() && recv.is_none() {
            return Err(Error::NullArgument);
        }
        self.ensure_ready(config.instance)?;
        let regs = self.regs(config.instance);
        let len = recv.as_deref().map_or(0, |r| r.len()).max(send.map_or(0, |s| s.len()));
        for i in 0..len {
            let out = send.and_then(|s| s.get(i)).copied();
            let word = exchange(regs, config.wait_policy, out)?;
            if let Some(r) = recv.as_deref_mut().and_then(|r| r.get_mut(i)) {
                *r = word;
            }
        }
        Ok(())
    }

    pub fn read_flag(&self, instance: BusInstance, flag: Flag) -> FlagStatus {
        flag.is_set(self.regs(instance).sr().read()).into()
    }

    /// Spin until `flag` is set, bounded by the wait policy of the applied config.
    pub fn wait_until_flag_set(&self, instance: BusInstance, flag: Flag) -> Result<(), Error> {
        let policy = self.config(instance).map_or(WaitPolicy::Forever, |c| c.wait_policy);
        spin_until(self.regs(instance), policy, |sr| flag.is_set(sr))
    }

    /// Read one word if one has arrived.
    pub fn try_read<W: Word>(&self, instance: BusInstance) -> nb::Result<W, Error> {
        let regs = self.regs(instance);
        if regs.sr().read().rxne() {
            Ok(W::from_dr(regs.dr().read().data()))
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Queue one word if the transmit buffer is free.
    pub fn try_write<W: Word>(&self, instance: BusInstance, word: W) -> nb::Result<(), Error> {
        let regs = self.regs(instance);
        if regs.sr().read().txe() {
            regs.dr().write(|w| w.set_data(word.to_dr()));
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}

fn exchange<W: Word>(regs: Regs<'_>, policy: WaitPolicy, send: Option<W>) -> Result<W, Error> {
    let out = send.map_or(W::SENTINEL, |w| w.to_dr());
    spin_until_tx_ready(regs, policy)?;
    regs.dr().write(|w| w.set_data(out));
    spin_until_rx_ready(regs, policy)?;
    Ok(W::from_dr(regs.dr().read().data()))
}
