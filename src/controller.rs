//! Single-slot command dispatcher: accepts one bus command at a time,
//! drives exactly one transaction to completion, and publishes status
//! transitions and device views through the `BusFacade` (§4.6).

use defmt::{debug, warn};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::device_cache::{
    DeviceCache, DeviceType, NetworkId, ATT_POWER, ERROR_STATUS, MODE_TIME, ON_OFF, ROOM_TEMP,
    SETPOINT_DEFROST, SETPOINT_NIGHT_DAY, SETPOINT_STATUS,
};
use crate::error::ControllerError;
use crate::frame::FrameBuf;
use crate::transaction;
use crate::Radio;

const SETPOINT_REG: (u8, u8) = (0x16, 0x31);
const MODE_TIME_REG: (u8, u8) = ((MODE_TIME >> 8) as u8, (MODE_TIME & 0xFF) as u8);
const ON_OFF_REG: (u8, u8) = ((ON_OFF >> 8) as u8, (ON_OFF & 0xFF) as u8);
const PAIR_ALREADY_PAIRED_REG: (u8, u8) = (0x14, 0x01);

/// Register read order for `device_status`; `device_status_short` uses only
/// the first four (§3.1).
const STATUS_REGISTERS: [u16; 7] = [
    ROOM_TEMP,
    SETPOINT_STATUS,
    ERROR_STATUS,
    ON_OFF,
    SETPOINT_DEFROST,
    SETPOINT_NIGHT_DAY,
    ATT_POWER,
];
const STATUS_REGISTERS_SHORT_LEN: usize = 4;

fn reg_pair(reg: u16) -> (u8, u8) {
    ((reg >> 8) as u8, (reg & 0xFF) as u8)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum ControllerStatus {
    Idle,
    Pairing,
    Reading,
    Writing,
    Temp,
    Status,
    Unpairing,
}

#[derive(Clone, Copy, Debug, defmt::Format)]
pub enum EnableMode {
    Day,
    Night,
    Defrost,
    Custom(u8),
    Timed(u8, u8),
}

#[derive(Clone, Debug, defmt::Format)]
pub enum Command {
    Reset,
    OutdoorTemp(i16),
    DeviceStatus(NetworkId),
    DeviceStatusShort(NetworkId),
    PairNetwork(NetworkId, DeviceType),
    PairAlreadyPaired(NetworkId, u16),
    Unpair(NetworkId, u16),
    Read(NetworkId, u16, u8, u8),
    Write(NetworkId, u16, u8, u8, [u16; 16]),
    Enable(NetworkId, u16, EnableMode),
    Disable(NetworkId, u16),
}

#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct CommandResult {
    pub ack_mask: u16,
    pub reg_high: u8,
    pub reg_low: u8,
    pub data: [u16; 16],
    pub slot_count: u8,
}

pub trait Persistence {
    fn load(&mut self, network: NetworkId) -> [u8; 16];
    fn store(&mut self, network: NetworkId, blob: &[u8; 16]);
}

pub trait BusFacade {
    fn publish_status(&mut self, status: ControllerStatus);
    fn publish_view(&mut self, network: NetworkId, views: &[crate::device_cache::SlotView]);
    fn publish_command_result(&mut self, result: CommandResult);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    Idle,
    Busy,
}

/// Owns the radio, the device cache, and the per-device counters used to
/// build outgoing frames. Constructed once per boot from the `device_id`
/// and persisted blobs the external boot sequence produces (§4.6.1); this
/// crate does not perform that boot sequence itself.
pub struct Controller<SPI, CS, D> {
    radio: Radio<SPI, CS, D>,
    cache: DeviceCache,
    device_id: u32,
    msg_no: u8,
    msg_id_counter: u16,
    state: State,
}

impl<SPI, CS, SpiE, CsE, D> Controller<SPI, CS, D>
where
    SPI: SpiBus<u8, Error = SpiE>,
    CS: OutputPin<Error = CsE>,
    D: DelayNs,
{
    pub fn new(radio: Radio<SPI, CS, D>, device_id: u32) -> Self {
        Self {
            radio,
            cache: DeviceCache::new(),
            device_id,
            msg_no: 0,
            msg_id_counter: 0,
            state: State::Idle,
        }
    }

    /// Load both networks' persisted blobs into the in-memory device cache
    /// (the last step of §4.6.1's boot sequence this crate owns).
    pub fn load_persistence(&mut self, persistence: &mut impl Persistence) {
        for network in [NetworkId::Four, NetworkId::Five] {
            let blob = persistence.load(network);
            self.cache.init_from_blob(network, &blob);
        }
    }

    fn next_msg_id(&mut self) -> u16 {
        self.msg_id_counter = self.msg_id_counter.wrapping_add(1);
        if self.msg_id_counter == 0 {
            self.msg_id_counter = 1;
        }
        self.msg_id_counter
    }

    /// Run `command` to completion. Returns `ControllerError::Busy` without
    /// touching any state if a transaction is already running (§4.6:
    /// "Transitioning to busy while already busy is a fatal policy error").
    pub fn dispatch(
        &mut self,
        command: Command,
        persistence: &mut impl Persistence,
        bus: &mut impl BusFacade,
    ) -> Result<(), ControllerError<SpiE>> {
        if self.state == State::Busy {
            warn!("controller: command rejected, already busy");
            return Err(ControllerError::Busy);
        }
        self.state = State::Busy;
        let result = self.dispatch_inner(command, persistence, bus);
        self.state = State::Idle;
        bus.publish_status(ControllerStatus::Idle);
        result
    }

    fn dispatch_inner(
        &mut self,
        command: Command,
        persistence: &mut impl Persistence,
        bus: &mut impl BusFacade,
    ) -> Result<(), ControllerError<SpiE>> {
        match command {
            Command::Reset => {
                debug!("controller: reset requested");
                Ok(())
            }
            Command::OutdoorTemp(celsius_centi) => self.outdoor_temp(celsius_centi, bus),
            Command::DeviceStatus(network) => self.device_status(network, &STATUS_REGISTERS, bus),
            Command::DeviceStatusShort(network) => {
                self.device_status(network, &STATUS_REGISTERS[..STATUS_REGISTERS_SHORT_LEN], bus)
            }
            Command::PairNetwork(network, device_type) => {
                self.pair_network(network, device_type, persistence, bus)
            }
            Command::PairAlreadyPaired(network, slot_set) => {
                self.write(network, slot_set, PAIR_ALREADY_PAIRED_REG, &[0; 16], bus)
            }
            Command::Unpair(network, slot_set) => self.unpair(network, slot_set, persistence, bus),
            Command::Read(network, slot_set, reg_high, reg_low) => {
                self.read(network, slot_set, (reg_high, reg_low), bus)
            }
            Command::Write(network, slot_set, reg_high, reg_low, values) => {
                self.write(network, slot_set, (reg_high, reg_low), &values, bus)
            }
            Command::Enable(network, slot_set, mode) => self.enable(network, slot_set, mode, bus),
            Command::Disable(network, slot_set) => {
                self.write(network, slot_set, ON_OFF_REG, &[0; 16], bus)
            }
        }
    }

    fn transfer_mask(&self, network: NetworkId) -> u16 {
        self.cache.transfer_mask(network)
    }

    fn buf(&self) -> FrameBuf {
        [0u8; crate::frame::FRAME_CAP]
    }

    fn outdoor_temp(&mut self, centi_celsius: i16, bus: &mut impl BusFacade) -> Result<(), ControllerError<SpiE>> {
        bus.publish_status(ControllerStatus::Temp);
        for network in [NetworkId::Four, NetworkId::Five] {
            let transfer_mask = self.transfer_mask(network);
            if transfer_mask == 0 {
                continue;
            }
            let mut buf = self.buf();
            let outcome = transaction::run_temperature_broadcast(
                &mut self.radio,
                &mut buf,
                &mut self.msg_no,
                self.device_id,
                network as u8,
                transfer_mask,
                true,
                centi_celsius,
            )?;
            bus.publish_command_result(CommandResult {
                ack_mask: outcome.ack_mask,
                reg_high: 0,
                reg_low: 0,
                data: [0; 16],
                slot_count: 0,
            });
        }
        Ok(())
    }

    fn device_status(
        &mut self,
        network: NetworkId,
        registers: &[u16],
        bus: &mut impl BusFacade,
    ) -> Result<(), ControllerError<SpiE>> {
        bus.publish_status(ControllerStatus::Status);
        let transfer_mask = self.transfer_mask(network);
        if transfer_mask == 0 {
            return Ok(());
        }
        for &reg in registers {
            let (reg_high, reg_low) = reg_pair(reg);
            let mut buf = self.buf();
            let outcome = transaction::run_read(
                &mut self.radio,
                &mut buf,
                &mut self.msg_no,
                self.device_id,
                network as u8,
                transfer_mask,
                transfer_mask,
                reg_high,
                reg_low,
            )?;
            for slot in 0..outcome.slot_count {
                let req_bit = transfer_mask & (1 << slot) != 0;
                let ack_bit = outcome.ack_mask & (1 << slot) != 0;
                self.cache
                    .decode_register(network, slot, reg, req_bit, ack_bit, outcome.data[slot as usize]);
            }
        }
        let views = heapless_views::collect(&self.cache, network);
        bus.publish_view(network, views.as_slice());
        Ok(())
    }

    fn pair_network(
        &mut self,
        network: NetworkId,
        device_type: DeviceType,
        persistence: &mut impl Persistence,
        bus: &mut impl BusFacade,
    ) -> Result<(), ControllerError<SpiE>> {
        bus.publish_status(ControllerStatus::Pairing);
        let Some(slot) = self.cache.lowest_free_slot(network) else {
            return Err(ControllerError::InvalidSlot);
        };
        let transfer_mask = self.transfer_mask(network);
        let mut buf = self.buf();
        let msg_id = self.next_msg_id();
        let outcome = transaction::run_pair(
            &mut self.radio,
            &mut buf,
            &mut self.msg_no,
            self.device_id,
            network as u8,
            transfer_mask,
            slot,
            msg_id,
        )?;
        if !outcome.success {
            debug!("pairing failed");
            return Ok(());
        }
        self.cache.create_slot(network, device_type, slot);
        persistence.store(network, &self.cache.to_blob(network));
        Ok(())
    }

    fn unpair(
        &mut self,
        network: NetworkId,
        slot_set: u16,
        persistence: &mut impl Persistence,
        bus: &mut impl BusFacade,
    ) -> Result<(), ControllerError<SpiE>> {
        bus.publish_status(ControllerStatus::Unpairing);
        for slot in 0..16u8 {
            if slot_set & (1 << slot) == 0 {
                continue;
            }
            let mut buf = self.buf();
            transaction::run_unpair(&mut self.radio, &mut buf, &mut self.msg_no, self.device_id, network as u8, slot)?;
            self.cache.destroy_slot(network, slot);
        }
        persistence.store(network, &self.cache.to_blob(network));
        Ok(())
    }

    fn read(
        &mut self,
        network: NetworkId,
        target_mask: u16,
        reg: (u8, u8),
        bus: &mut impl BusFacade,
    ) -> Result<(), ControllerError<SpiE>> {
        bus.publish_status(ControllerStatus::Reading);
        let transfer_mask = self.transfer_mask(network);
        let mut buf = self.buf();
        let outcome = transaction::run_read(
            &mut self.radio,
            &mut buf,
            &mut self.msg_no,
            self.device_id,
            network as u8,
            transfer_mask,
            target_mask,
            reg.0,
            reg.1,
        )?;
        bus.publish_command_result(CommandResult {
            ack_mask: outcome.ack_mask,
            reg_high: reg.0,
            reg_low: reg.1,
            data: outcome.data,
            slot_count: outcome.slot_count,
        });
        Ok(())
    }

    fn write(
        &mut self,
        network: NetworkId,
        target_mask: u16,
        reg: (u8, u8),
        values: &[u16],
        bus: &mut impl BusFacade,
    ) -> Result<(), ControllerError<SpiE>> {
        bus.publish_status(ControllerStatus::Writing);
        let transfer_mask = self.transfer_mask(network);
        let mut buf = self.buf();
        let outcome = transaction::run_write(
            &mut self.radio,
            &mut buf,
            &mut self.msg_no,
            self.device_id,
            network as u8,
            transfer_mask,
            target_mask,
            reg.0,
            reg.1,
            values,
        )?;
        bus.publish_command_result(CommandResult {
            ack_mask: outcome.ack_mask,
            reg_high: reg.0,
            reg_low: reg.1,
            data: [0; 16],
            slot_count: 0,
        });
        Ok(())
    }

    /// Composed of writes to `SETPOINT`, `MODE_TIME`, and `ON_OFF` (§3.1,
    /// §6). `disable` is handled separately as a plain `ON_OFF=0` write.
    fn enable(
        &mut self,
        network: NetworkId,
        slot_set: u16,
        mode: EnableMode,
        bus: &mut impl BusFacade,
    ) -> Result<(), ControllerError<SpiE>> {
        let (setpoint, mode_time) = match mode {
            EnableMode::Day => (0u8, 0u8),
            EnableMode::Night => (1, 0),
            EnableMode::Defrost => (2, 0),
            EnableMode::Custom(t) => (t, 0),
            EnableMode::Timed(t, d) => (t, d),
        };
        self.write(network, slot_set, SETPOINT_REG, &[setpoint as u16; 16], bus)?;
        self.write(network, slot_set, MODE_TIME_REG, &[mode_time as u16; 16], bus)?;
        self.write(network, slot_set, ON_OFF_REG, &[1u16; 16], bus)
    }
}

/// Small fixed-capacity collector for the slot views one `device_status`
/// call can publish, avoiding a heap allocation for something bounded at
/// 16 entries.
mod heapless_views {
    use crate::device_cache::{DeviceCache, NetworkId, SlotView};

    pub fn collect(cache: &DeviceCache, network: NetworkId) -> CollectedViews {
        let mut out = CollectedViews { buf: [SlotView { network, slot: 0, state: Default::default() }; 16], len: 0 };
        for slot in 0..16u8 {
            if let Some(view) = cache.slot_view(network, slot) {
                out.buf[out.len] = view;
                out.len += 1;
            }
        }
        out
    }

    #[derive(Clone, Copy)]
    pub struct CollectedViews {
        buf: [SlotView; 16],
        len: usize,
    }

    impl CollectedViews {
        pub fn as_slice(&self) -> &[SlotView] {
            &self.buf[..self.len]
        }
    }
}
