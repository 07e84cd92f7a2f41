//! SPI transport for the radio: single-register read/write and FIFO burst
//! transfers. The chip's write/read bit convention is the MSB of the address
//! byte (set = write, clear = read); every transaction is bracketed by the
//! caller-supplied chip-select pin going low then high.

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::shared::{split_addr, RadioError, Register};

const WRITE_BIT: u8 = 1 << 7;

/// Owns the SPI bus and chip-select pin. Generic over both so the driver
/// works against any `embedded-hal` implementation, not a specific MCU HAL.
pub struct Interface<SPI, CS> {
    pub spi: SPI,
    pub cs: CS,
}

impl<SPI, CS, SpiE, CsE> Interface<SPI, CS>
where
    SPI: SpiBus<u8, Error = SpiE>,
    CS: OutputPin<Error = CsE>,
{
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self { spi, cs }
    }

    /// Write a single byte to a register.
    pub fn write_reg(&mut self, reg: Register, val: u8) -> Result<(), RadioError<SpiE>> {
        let (_, addr) = split_addr(reg as u16);
        let _ = self.cs.set_low();
        let result = self.spi.write(&[addr | WRITE_BIT, val]);
        let _ = self.cs.set_high();
        result.map_err(RadioError::Spi)
    }

    /// Read a single byte from a register.
    pub fn read_reg(&mut self, reg: Register) -> Result<u8, RadioError<SpiE>> {
        let (_, addr) = split_addr(reg as u16);
        let mut buf = [addr, 0];
        let _ = self.cs.set_low();
        let result = self.spi.transfer_in_place(&mut buf);
        let _ = self.cs.set_high();
        result.map_err(RadioError::Spi)?;
        Ok(buf[1])
    }

    /// Read-modify-write a single register: clear `mask` then OR in `val`.
    pub fn update_reg(&mut self, reg: Register, mask: u8, val: u8) -> Result<(), RadioError<SpiE>> {
        let current = self.read_reg(reg)?;
        self.write_reg(reg, (current & !mask) | (val & mask))
    }

    /// Burst-write the FIFO: a length byte followed by `payload`, as a
    /// single SPI transaction.
    pub fn write_fifo(&mut self, payload: &[u8]) -> Result<(), RadioError<SpiE>> {
        let (_, fifo_addr) = split_addr(Register::Fifo as u16);
        let _ = self.cs.set_low();
        let header = self.spi.write(&[fifo_addr | WRITE_BIT, payload.len() as u8]);
        let body = if header.is_ok() {
            self.spi.write(payload)
        } else {
            header
        };
        let _ = self.cs.set_high();
        body.map_err(RadioError::Spi)
    }

    /// Burst-read the FIFO into `out`, returning the number of bytes the
    /// chip reported as the packet length (before clamping by the caller).
    pub fn read_fifo(&mut self, out: &mut [u8]) -> Result<u8, RadioError<SpiE>> {
        let (_, fifo_addr) = split_addr(Register::Fifo as u16);
        let mut len_buf = [fifo_addr, 0];
        let _ = self.cs.set_low();
        let header = self.spi.transfer_in_place(&mut len_buf);
        let len = len_buf[1];
        let to_read = (len as usize).min(out.len());
        let body = if header.is_ok() {
            for slot in out.iter_mut().take(to_read) {
                *slot = 0;
            }
            self.spi.transfer_in_place(&mut out[..to_read])
        } else {
            header
        };
        let _ = self.cs.set_high();
        body.map_err(RadioError::Spi)?;
        Ok(len)
    }
}
