//! Code relating to configuring the radio's air interface. Each public
//! method maps to one (or a small read-modify-write group of) register
//! writes; callers are free to call these in any order except that
//! modulation parameters must be set while the chip is in [`Mode::Standby`].

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::params::{
    ClkOut, ContinuousDagc, DataMode, DccCutoff, InterPacketRxDelay, ModulationShaping,
    ModulationType, PacketDcFree, PacketFiltering, PacketFormat, RxBwFsk, SensitivityBoost,
};
use crate::shared::{Register, RadioError};
use crate::Radio;

/// Oscillator frequency, Hz. DS section 3.4.
const F_XTAL: f64 = 32_000_000.0;
/// Frequency synthesizer step, Hz. `Fstep = Fxtal / 2^19`.
const F_STEP: f64 = F_XTAL / (1u32 << 19) as f64;

impl<SPI, CS, SpiE, CsE, D> Radio<SPI, CS, D>
where
    SPI: SpiBus<u8, Error = SpiE>,
    CS: OutputPin<Error = CsE>,
{
    /// Data-processing mode, modulation type, and pulse shaping (DATA-MODUL, 0x02).
    pub fn modulation(
        &mut self,
        data_mode: DataMode,
        modulation: ModulationType,
        shaping: ModulationShaping,
    ) -> Result<(), RadioError<SpiE>> {
        self.interface.write_reg(
            Register::DataModul,
            data_mode as u8 | modulation as u8 | shaping as u8,
        )
    }

    /// Bit rate in bits per second. Register = round(32 MHz / bitrate).
    pub fn bit_rate(&mut self, bps: u32) -> Result<(), RadioError<SpiE>> {
        let reg = ((F_XTAL / bps as f64).round() as u32).min(u16::MAX as u32) as u16;
        let [msb, lsb] = reg.to_be_bytes();
        self.interface.write_reg(Register::BitrateMsb, msb)?;
        self.interface.write_reg(Register::BitrateLsb, lsb)
    }

    /// Frequency deviation in Hz. Register = round(fdev / Fstep).
    pub fn fdev(&mut self, hz: u32) -> Result<(), RadioError<SpiE>> {
        let reg = ((hz as f64 / F_STEP).round() as u32).min(0x3FFF) as u16;
        let [msb, lsb] = reg.to_be_bytes();
        self.interface.write_reg(Register::FdevMsb, msb)?;
        self.interface.write_reg(Register::FdevLsb, lsb)
    }

    /// Carrier frequency in Hz. Register = round(freq / Fstep), written as 24 bits.
    pub fn frequency(&mut self, hz: u32) -> Result<(), RadioError<SpiE>> {
        let reg = (hz as f64 / F_STEP).round() as u32;
        let bytes = reg.to_be_bytes(); // [_, msb, mid, lsb]
        self.interface.write_reg(Register::FrfMsb, bytes[1])?;
        self.interface.write_reg(Register::FrfMid, bytes[2])?;
        self.interface.write_reg(Register::FrfLsb, bytes[3])
    }

    /// Channel filter bandwidth and DCC cutoff for the main receive path (RX-BW, 0x19).
    pub fn rx_bw(&mut self, cutoff: DccCutoff, bw: RxBwFsk) -> Result<(), RadioError<SpiE>> {
        self.interface
            .write_reg(Register::RxBw, cutoff as u8 | bw as u8)
    }

    /// Channel filter bandwidth and DCC cutoff for AFC (AFC-BW, 0x1A).
    pub fn rx_afc_bw(&mut self, cutoff: DccCutoff, bw: RxBwFsk) -> Result<(), RadioError<SpiE>> {
        self.interface
            .write_reg(Register::AfcBw, cutoff as u8 | bw as u8)
    }

    /// AFC/FEI control (AFC-CTRL, 0x0B). The source packs five booleans into
    /// one register but writes two flags (`auto_on`, `clear`) to the same
    /// bit position; this crate resolves the collision by OR-ing both into
    /// that bit rather than picking one to silently win (§9 of the design
    /// notes).
    pub fn afc_fei(
        &mut self,
        fei_start: bool,
        autoclear_on: bool,
        auto_on: bool,
        clear: bool,
        start: bool,
    ) -> Result<(), RadioError<SpiE>> {
        let val = (fei_start as u8) << 5
            | (autoclear_on as u8) << 3
            | (auto_on as u8 | clear as u8) << 2
            | start as u8;
        self.interface.write_reg(Register::AfcCtrl, val)
    }

    /// Receiver RSSI threshold, in units of -0.5 dBm (e.g. `114*2` for -114 dBm).
    pub fn rssi_threshold(&mut self, raw: u8) -> Result<(), RadioError<SpiE>> {
        self.interface.write_reg(Register::RssiThresh, raw)
    }

    /// Preamble length in bytes.
    pub fn preamble(&mut self, len: u16) -> Result<(), RadioError<SpiE>> {
        let [msb, lsb] = len.to_be_bytes();
        self.interface.write_reg(Register::PreambleMsb, msb)?;
        self.interface.write_reg(Register::PreambleLsb, lsb)
    }

    /// Sync word configuration (SYNC-CONFIG + SYNC-VALUE1..8).
    pub fn sync(
        &mut self,
        on: bool,
        fifo_fill_auto: bool,
        size: u8,
        tolerance: u8,
        value: &[u8],
    ) -> Result<(), RadioError<SpiE>> {
        debug_assert!((1..=8).contains(&value.len()));
        let size_bits = (value.len().max(1) as u8 - 1) << 3;
        let config = (on as u8) << 7
            | (!fifo_fill_auto as u8) << 6
            | size_bits
            | (tolerance & 0x07);
        self.interface.write_reg(Register::SyncConfig, config)?;

        let sync_regs = [
            Register::SyncValue1,
            Register::SyncValue2,
            Register::SyncValue3,
            Register::SyncValue4,
            Register::SyncValue5,
            Register::SyncValue6,
            Register::SyncValue7,
            Register::SyncValue8,
        ];
        for (reg, byte) in sync_regs.iter().zip(value.iter()) {
            self.interface.write_reg(*reg, *byte)?;
        }
        let _ = size;
        Ok(())
    }

    /// Packet framing configuration (PACKET-CONFIG1/2, PAYLOAD-LENGTH).
    #[allow(clippy::too_many_arguments)]
    pub fn packet(
        &mut self,
        format: PacketFormat,
        dc_free: PacketDcFree,
        payload_len: u8,
        crc_on: bool,
        crc_autoclear_off: bool,
        filtering: PacketFiltering,
        inter_packet_delay: InterPacketRxDelay,
        auto_rx_restart: bool,
        aes_on: bool,
    ) -> Result<(), RadioError<SpiE>> {
        let config1 =
            format as u8 | dc_free as u8 | (crc_on as u8) << 4 | (crc_autoclear_off as u8) << 3 | filtering as u8;
        self.interface.write_reg(Register::PacketConfig1, config1)?;
        self.interface.write_reg(Register::PayloadLength, payload_len)?;
        let config2 = inter_packet_delay as u8 | (auto_rx_restart as u8) << 1 | aes_on as u8;
        self.interface.write_reg(Register::PacketConfig2, config2)
    }

    /// FIFO threshold level, and whether Tx starts as soon as the threshold fills.
    pub fn fifo_threshold(&mut self, tx_start_on_fill: bool, level: u8) -> Result<(), RadioError<SpiE>> {
        self.interface.write_reg(
            Register::FifoThresh,
            (tx_start_on_fill as u8) << 7 | (level & 0x7F),
        )
    }

    /// Receiver sensitivity boost (TEST-LNA, 0x58).
    pub fn sensitivity_boost(&mut self, mode: SensitivityBoost) -> Result<(), RadioError<SpiE>> {
        self.interface.write_reg(Register::TestLna, mode as u8)
    }

    /// Continuous DAGC tuning (TEST-DAGC, 0x6F).
    pub fn continuous_dagc(&mut self, mode: ContinuousDagc) -> Result<(), RadioError<SpiE>> {
        self.interface.write_reg(Register::TestDagc, mode as u8)
    }

    /// PA selection and output power level (PA-LEVEL, 0x11). `power` is 0..31.
    pub fn pa_level(&mut self, pa0: bool, pa1: bool, pa2: bool, power: u8) -> Result<(), RadioError<SpiE>> {
        let val = (pa0 as u8) << 7 | (pa1 as u8) << 6 | (pa2 as u8) << 5 | (power & 0x1F);
        self.interface.write_reg(Register::PaLevel, val)
    }

    /// Over-current protection: enable and trim (0..15).
    pub fn ocp(&mut self, enabled: bool, trim: u8) -> Result<(), RadioError<SpiE>> {
        self.interface
            .write_reg(Register::Ocp, (enabled as u8) << 4 | (trim & 0x0F))
    }

    /// Recompute and write the DIO-mapping and CLKOUT registers from the
    /// driver's own DIO table for the currently cached [`Mode`]. Called on
    /// every mode change, before the OP-MODE write (§4.3 of the design
    /// notes); also callable directly after registering new DIO entries.
    pub(crate) fn write_dio_mapping(&mut self, clk_out: ClkOut) -> Result<(), RadioError<SpiE>> {
        let value = self.dio_register_value();
        let [hi, lo] = value.to_be_bytes();
        self.interface.write_reg(Register::DioMapping1, hi)?;
        self.interface
            .write_reg(Register::DioMapping2, lo | clk_out as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_rate_40k_matches_original_firmware_register() {
        // 32e6 / 40000 = 800
        let reg = ((F_XTAL / 40_000_f64).round() as u32) as u16;
        assert_eq!(reg, 800);
    }

    #[test]
    fn frequency_868_95mhz_rounds_to_expected_register() {
        let reg = (868_950_000_f64 / F_STEP).round() as u32;
        // Fstep = 32MHz / 2^19 ~= 61.03515625 Hz
        assert_eq!(reg, 14_237_777);
    }
}
