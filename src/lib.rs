//! SX1231/RFM69 radio driver and X3D mesh protocol engine for a
//! heating-actuator gateway.
//!
//! The driver (this module, [`configure`], [`status`], [`spi_interface`],
//! [`params`], [`shared`]) hides the chip's register map behind semantic
//! operations. Everything protocol-shaped — framing, retries, merging,
//! device state — lives in [`frame`], [`obfuscate`], [`transaction`],
//! [`device_cache`] and [`controller`].

#![no_std]

#[cfg(test)]
extern crate std;

mod configure;
pub mod controller;
pub mod device_cache;
pub mod error;
pub mod frame;
pub mod obfuscate;
pub mod params;
pub mod shared;
pub mod spi_interface;
mod status;
pub mod transaction;

use defmt::{debug, warn};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::params::{
    ContinuousDagc, DataMode, DccCutoff, DioPin, DioRole, DioType, InterPacketRxDelay,
    IrqFlags2, ListenMode, Mode, ModulationShaping, ModulationType, PacketDcFree, PacketFiltering,
    PacketFormat, RxBwFsk, SensitivityBoost,
};
use crate::shared::RadioError;
use crate::spi_interface::Interface;

/// Maximum payload the air interface carries in one packet (§6).
pub const MAX_PAYLOAD: usize = 64;

/// A DIO-mapping table entry: which pin, which 2-bit type code, and in
/// which mode(s) it is active. Capacity 8 comfortably covers the six
/// physical pins even when a pin carries distinct Tx and Rx entries (as
/// DIO0 does in [`RadioProfile::default`]'s bring-up sequence).
pub type DioEntry = (DioPin, DioType, DioRole);

/// Bundles the air-interface literals of §6 behind a `Default` impl, so
/// call sites pass one value instead of repeating magic numbers.
#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct RadioProfile {
    pub bitrate_bps: u32,
    pub fdev_hz: u32,
    pub frequency_hz: u32,
    pub rx_bw_cutoff: DccCutoff,
    pub rx_bw: RxBwFsk,
    pub afc_bw_cutoff: DccCutoff,
    pub afc_bw: RxBwFsk,
    pub rssi_threshold_raw: u8,
    pub preamble_len: u16,
    pub sync_word: [u8; 4],
    pub pa_power: u8,
}

impl Default for RadioProfile {
    fn default() -> Self {
        Self {
            bitrate_bps: 40_000,
            fdev_hz: 80_000,
            frequency_hz: 868_950_000,
            rx_bw_cutoff: DccCutoff::Percent4,
            rx_bw: RxBwFsk::Khz125Dot0,
            afc_bw_cutoff: DccCutoff::Percent1,
            afc_bw: RxBwFsk::Khz41Dot7,
            rssi_threshold_raw: 114 * 2,
            preamble_len: 4,
            sync_word: [0x81, 0x69, 0x96, 0x7E],
            pa_power: 23,
        }
    }
}

/// Owns the SPI transport, the cached operating mode, the DIO routing
/// table, and the delay provider used for bounded register-ready polling.
pub struct Radio<SPI, CS, D> {
    pub(crate) interface: Interface<SPI, CS>,
    pub(crate) delay: D,
    pub(crate) mode: Mode,
    pub(crate) listen_mode: ListenMode,
    pub(crate) dio_table: [Option<DioEntry>; 8],
}

impl<SPI, CS, SpiE, CsE, D> Radio<SPI, CS, D>
where
    SPI: SpiBus<u8, Error = SpiE>,
    CS: OutputPin<Error = CsE>,
    D: DelayNs,
{
    /// Bring up the chip: probe it via a scratch-register read/write round
    /// trip, disable over-current protection trim-limited, enter Standby,
    /// and wait for ModeReady (§4.3 Initialisation).
    pub fn new(spi: SPI, cs: CS, delay: D) -> Result<Self, RadioError<SpiE>> {
        let mut radio = Self {
            interface: Interface::new(spi, cs),
            delay,
            mode: Mode::Sleep,
            listen_mode: ListenMode::Off,
            dio_table: [None; 8],
        };

        radio.probe()?;
        radio.ocp(false, 15)?;
        radio.set_mode(Mode::Standby)?;
        radio.wait_mode_ready()?;
        debug!("radio initialised");
        Ok(radio)
    }

    fn probe(&mut self) -> Result<(), RadioError<SpiE>> {
        use crate::shared::Register;
        for probe_val in [0xAAu8, 0x55u8] {
            self.interface.write_reg(Register::SyncValue1, probe_val)?;
            let read_back = self.interface.read_reg(Register::SyncValue1)?;
            if read_back != probe_val {
                warn!("SX1231 probe mismatch");
                return Err(RadioError::ProbeMismatch);
            }
        }
        Ok(())
    }

    /// Apply the full air-interface bring-up sequence (§4.3.1): modulation,
    /// bit rate, deviation, frequency, RX/AFC bandwidths, AFC/FEI control,
    /// DIO0 Tx/Rx mapping, RSSI threshold, preamble, sync word, packet
    /// framing, FIFO threshold, sensitivity boost, continuous DAGC, mode,
    /// and PA level — in that order, matching the original firmware's
    /// `rfm_init` call sequence.
    pub fn configure(&mut self, profile: &RadioProfile) -> Result<(), RadioError<SpiE>> {
        self.modulation(DataMode::Packet, ModulationType::Fsk, ModulationShaping::Shaping00)?;
        self.bit_rate(profile.bitrate_bps)?;
        self.fdev(profile.fdev_hz)?;
        self.frequency(profile.frequency_hz)?;
        self.rx_bw(profile.rx_bw_cutoff, profile.rx_bw)?;
        self.rx_afc_bw(profile.afc_bw_cutoff, profile.afc_bw)?;
        self.afc_fei(false, true, true, true, false)?;
        self.dio_mapping(DioPin::Dio0, DioType::Type00, DioRole::Tx)?;
        self.dio_mapping(DioPin::Dio0, DioType::Type01, DioRole::Rx)?;
        self.rssi_threshold(profile.rssi_threshold_raw)?;
        self.preamble(profile.preamble_len)?;
        self.sync(true, false, profile.sync_word.len() as u8, 0, &profile.sync_word)?;
        self.packet(
            PacketFormat::Variable,
            PacketDcFree::Whitening,
            MAX_PAYLOAD as u8,
            false,
            false,
            PacketFiltering::None,
            InterPacketRxDelay::Bits32,
            true,
            false,
        )?;
        self.fifo_threshold(true, 15)?;
        self.sensitivity_boost(SensitivityBoost::HighSensitivity)?;
        self.continuous_dagc(ContinuousDagc::ImprovedMarginAfcLowBetaOn0)?;
        self.set_mode(Mode::Standby)?;
        self.pa_level(false, true, true, profile.pa_power)
    }

    /// Transition to Standby, clear the "have data" state implicitly by
    /// re-entering Receiver mode. DIO0 then fires on PayloadReady.
    pub fn receive_begin(&mut self) -> Result<(), RadioError<SpiE>> {
        self.set_mode(Mode::Standby)?;
        self.set_mode(Mode::Receiver)
    }

    /// Drain a received packet if one is ready; returns `0` and leaves
    /// `out` untouched when none is. The length byte the chip reports is
    /// clamped to [`MAX_PAYLOAD`] as a defensive measure against a runaway
    /// or corrupted length field.
    pub fn check_received(&mut self, out: &mut [u8; MAX_PAYLOAD]) -> Result<usize, RadioError<SpiE>> {
        if !self.has_flag2(IrqFlags2::PayloadReady)? {
            return Ok(0);
        }
        self.set_mode(Mode::Standby)?;
        let reported_len = self.interface.read_fifo(out)?;
        self.set_mode(Mode::Receiver)?;
        Ok((reported_len as usize).min(MAX_PAYLOAD))
    }

    /// Block the calling task for `ms` milliseconds via the delay provider.
    /// Used by the transaction engine's inter-send and listen-window waits.
    pub fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    /// Send `payload` and wait for either PacketSent or the 50 ms deadline.
    /// Does not resume Rx; callers call [`Radio::receive_begin`] afterwards
    /// if reception should continue.
    pub fn transmit(&mut self, payload: &[u8]) -> Result<(), RadioError<SpiE>> {
        debug_assert!(payload.len() <= MAX_PAYLOAD);
        self.set_mode(Mode::Standby)?;
        self.wait_mode_ready()?;
        self.interface.write_fifo(payload)?;
        self.set_mode(Mode::Transmitter)?;
        self.poll_until(
            |r| r.has_flag2(IrqFlags2::PacketSent),
            RadioError::PacketSentTimeout,
        )
    }
}
