//! Operating-mode state machine, DIO routing, and IRQ/RSSI readback.
//!
//! Invariant: whenever `mode` changes, DIO routing is recomputed and written
//! before the OP-MODE register write takes effect (§4.3 of the design
//! notes). The cached mode short-circuits redundant writes.

use defmt::{debug, trace};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::params::{ClkOut, DioPin, DioType, IrqFlags1, IrqFlags2, ListenMode, Mode};
use crate::shared::{Register, RadioError};
use crate::Radio;

/// Polling budget for a single ModeReady/PayloadReady/PacketSent wait: 50
/// iterations of ~1 ms each, matching the 50 ms deadlines in §4.3.
const POLL_DEADLINE_MS: u32 = 50;

impl<SPI, CS, SpiE, CsE, D> Radio<SPI, CS, D>
where
    SPI: SpiBus<u8, Error = SpiE>,
    CS: OutputPin<Error = CsE>,
    D: DelayNs,
{
    /// Register a DIO pin's role. Takes effect on the next mode change, or
    /// immediately if `recompute_now` is set.
    pub fn dio_mapping(
        &mut self,
        pin: DioPin,
        dio_type: DioType,
        role: crate::params::DioRole,
    ) -> Result<(), RadioError<SpiE>> {
        for slot in self.dio_table.iter_mut() {
            match slot {
                Some((p, t, _)) if *p as u8 == pin as u8 && *t as u8 == dio_type as u8 => {
                    *slot = Some((pin, dio_type, role));
                    return self.write_dio_mapping(ClkOut::Off);
                }
                None => {
                    *slot = Some((pin, dio_type, role));
                    return self.write_dio_mapping(ClkOut::Off);
                }
                _ => {}
            }
        }
        debug!("DIO table full, dropping mapping for pin");
        Ok(())
    }

    pub(crate) fn dio_register_value(&self) -> u16 {
        let mut value = 0u16;
        for (pin, dio_type, role) in self.dio_table.iter().flatten() {
            let active = match self.mode {
                Mode::Transmitter => role.active_in_tx(),
                Mode::Receiver => role.active_in_rx(),
                _ => false,
            };
            if active {
                value |= (*dio_type as u16) << (*pin as u8);
            }
        }
        value
    }

    /// Transition to a new operating mode. A no-op (no register write) when
    /// `mode` already matches the cached mode.
    pub fn set_mode(&mut self, mode: Mode) -> Result<(), RadioError<SpiE>> {
        if self.mode == mode {
            return Ok(());
        }
        self.mode = mode;
        self.write_dio_mapping(ClkOut::Off)?;

        let listen_bits = match self.listen_mode {
            ListenMode::On => ListenMode::On as u8,
            ListenMode::Off => 0,
        };
        trace!("setting radio mode");
        self.interface
            .write_reg(Register::OpMode, mode as u8 | listen_bits)
    }

    pub fn set_listen_mode(&mut self, listen: ListenMode) -> Result<(), RadioError<SpiE>> {
        self.listen_mode = listen;
        self.interface
            .write_reg(Register::OpMode, self.mode as u8 | listen as u8)
    }

    pub fn irq_flags1(&mut self) -> Result<u8, RadioError<SpiE>> {
        self.interface.read_reg(Register::IrqFlags1)
    }

    pub fn irq_flags2(&mut self) -> Result<u8, RadioError<SpiE>> {
        self.interface.read_reg(Register::IrqFlags2)
    }

    pub(crate) fn has_flag1(&mut self, flag: IrqFlags1) -> Result<bool, RadioError<SpiE>> {
        Ok(self.irq_flags1()? & flag as u8 != 0)
    }

    pub(crate) fn has_flag2(&mut self, flag: IrqFlags2) -> Result<bool, RadioError<SpiE>> {
        Ok(self.irq_flags2()? & flag as u8 != 0)
    }

    /// Poll a predicate until it returns true or the 50 ms deadline expires.
    pub(crate) fn poll_until<F>(
        &mut self,
        mut predicate: F,
        timeout: RadioError<SpiE>,
    ) -> Result<(), RadioError<SpiE>>
    where
        F: FnMut(&mut Self) -> Result<bool, RadioError<SpiE>>,
    {
        for _ in 0..POLL_DEADLINE_MS {
            if predicate(self)? {
                return Ok(());
            }
            self.delay.delay_ms(1);
        }
        Err(timeout)
    }

    pub fn wait_mode_ready(&mut self) -> Result<(), RadioError<SpiE>> {
        self.poll_until(
            |r| r.has_flag1(IrqFlags1::ModeReady),
            RadioError::ModeReadyTimeout,
        )
    }

    /// Read instantaneous RSSI, in -0.5 dBm units negated (i.e. dBm = -(raw)/2).
    pub fn read_rssi(&mut self) -> Result<i16, RadioError<SpiE>> {
        let raw = self.interface.read_reg(Register::RssiValue)?;
        Ok(-(raw as i16) / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::Mode;

    #[test]
    fn mode_values_are_in_bits_2_to_4() {
        assert_eq!(Mode::Sleep as u8, 0b000_00);
        assert_eq!(Mode::Standby as u8, 0b001_00);
        assert_eq!(Mode::Transmitter as u8, 0b011_00);
        assert_eq!(Mode::Receiver as u8, 0b100_00);
    }
}
