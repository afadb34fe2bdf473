//! Translates a validated [`Config`] into `CR1`/`CR2` field writes.

use super::config::{BitOrder, Config, CrcState, DataWidth, DuplexMode, MultiMaster, Role};
use crate::pac::Regs;

/// Program every mode field of `config`, one read-modify-write per field.
///
/// `SPE` is written last so nothing is latched half-configured. When the bus
/// is already enabled it is switched off first. Master-only fields are cleared
/// in slave role.
pub(crate) fn program(regs: Regs<'_>, config: &Config) {
    let master = config.role == Role::Master;

    if regs.cr1().read().spe() {
        regs.cr1().modify(|w| w.set_spe(false));
    }

    regs.cr1().modify(|w| w.set_br(if master { config.baud_divisor as u8 } else { 0 }));
    regs.cr1().modify(|w| w.set_cpol(config.clock_polarity as u8 != 0));
    regs.cr1().modify(|w| w.set_cpha(config.clock_phase as u8 != 0));
    regs.cr1().modify(|w| match config.duplex_mode {
        DuplexMode::SimplexReceive => {
            w.set_bidimode(false);
            w.set_bidioe(false);
            w.set_rxonly(true);
        }
        mode => {
            // BIDIMODE:BIDIOE
            let bits = mode as u8;
            w.set_bidimode(bits & 0b10 != 0);
            w.set_bidioe(bits & 0b01 != 0);
            w.set_rxonly(false);
        }
    });
    regs.cr1().modify(|w| w.set_lsbfirst(config.bit_order == BitOrder::LsbFirst));
    regs.cr1().modify(|w| w.set_crcen(config.crc == CrcState::Enabled));
    regs.cr1().modify(|w| {
        // SSM:SSI
        let bits = config.slave_management as u8;
        w.set_ssm(bits & 0b10 != 0);
        w.set_ssi(bits & 0b01 != 0);
    });
    regs.cr1().modify(|w| w.set_mstr(master));
    regs.cr1().modify(|w| w.set_dff(config.data_width == DataWidth::Bits16));
    regs.cr2()
        .modify(|w| w.set_ssoe(master && config.multi_master == MultiMaster::NotProvided));

    regs.cr1().modify(|w| w.set_spe(true));
}
