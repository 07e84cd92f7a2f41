//! Per-network device table: up to 16 ordered slots, each holding a typed
//! view of one paired actuator, plus the transfer-mask bookkeeping and
//! register-decode dispatch (§4.5).

pub const ATT_POWER: u16 = 0x1151;
pub const ROOM_TEMP: u16 = 0x1511;
pub const SETPOINT_STATUS: u16 = 0x1611;
pub const ERROR_STATUS: u16 = 0x1621;
pub const ON_OFF: u16 = 0x1641;
pub const SETPOINT_DEFROST: u16 = 0x1681;
pub const SETPOINT_NIGHT_DAY: u16 = 0x1691;
/// Recognised but intentionally inert: a write target for the `enable(...,
/// timed)` bus command, accepted by the decode dispatch with no field
/// update (§3.1).
pub const MODE_TIME: u16 = 0x1661;

#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
#[repr(u8)]
pub enum NetworkId {
    Four = 4,
    Five = 5,
}

impl NetworkId {
    fn index(self) -> usize {
        match self {
            NetworkId::Four => 0,
            NetworkId::Five => 1,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
#[repr(u8)]
pub enum DeviceType {
    None = 0,
    Rf66xx = 1,
}

impl DeviceType {
    fn from_tag(tag: u8) -> Self {
        match tag {
            1 => DeviceType::Rf66xx,
            _ => DeviceType::None,
        }
    }
}

/// Cached, register-decoded view of one RF66xx thermostat.
#[derive(Clone, Copy, Default, Debug, defmt::Format)]
pub struct Rf66xxState {
    pub room_temp: u16,
    pub power: u8,
    pub set_point: u8,
    pub set_point_day: u8,
    pub set_point_night: u8,
    pub set_point_defrost: u8,
    pub on_air: bool,
    pub enabled: bool,
    pub defrost: bool,
    pub timed: bool,
    pub heater_on: bool,
    pub heater_stopped: bool,
    pub window_open: bool,
    pub no_temp_sensor: bool,
    pub battery_low: bool,
}

/// A slot's tagged-union payload. Only one variant exists today; new
/// device families plug in as new variants rather than a `void*` payload
/// (§9, "Device polymorphism").
#[derive(Clone, Copy, Debug, defmt::Format)]
pub enum DeviceSlot {
    Rf66xx(Rf66xxState),
}

#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct SlotView {
    pub network: NetworkId,
    pub slot: u8,
    pub state: Rf66xxState,
}

struct NetworkCache {
    slots: [Option<DeviceSlot>; 16],
    transfer_mask: u16,
}

impl NetworkCache {
    const fn empty() -> Self {
        Self { slots: [None; 16], transfer_mask: 0 }
    }
}

pub struct DeviceCache {
    networks: [NetworkCache; 2],
}

impl Default for DeviceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceCache {
    pub const fn new() -> Self {
        Self { networks: [NetworkCache::empty(), NetworkCache::empty()] }
    }

    fn net(&self, network: NetworkId) -> &NetworkCache {
        &self.networks[network.index()]
    }

    fn net_mut(&mut self, network: NetworkId) -> &mut NetworkCache {
        &mut self.networks[network.index()]
    }

    pub fn transfer_mask(&self, network: NetworkId) -> u16 {
        self.net(network).transfer_mask
    }

    /// Restore per-slot types from a persisted 16-byte blob and rebuild the
    /// transfer mask by scanning it. A missing blob is represented by the
    /// caller passing all-`NONE` (§6, §7 persistence-failure policy).
    pub fn init_from_blob(&mut self, network: NetworkId, blob: &[u8; 16]) {
        let net = self.net_mut(network);
        *net = NetworkCache::empty();
        for (i, &tag) in blob.iter().enumerate() {
            if DeviceType::from_tag(tag) == DeviceType::Rf66xx {
                net.slots[i] = Some(DeviceSlot::Rf66xx(Rf66xxState::default()));
                net.transfer_mask |= 1 << i;
            }
        }
    }

    pub fn to_blob(&self, network: NetworkId) -> [u8; 16] {
        let mut blob = [0u8; 16];
        for (i, slot) in self.net(network).slots.iter().enumerate() {
            blob[i] = match slot {
                Some(DeviceSlot::Rf66xx(_)) => DeviceType::Rf66xx as u8,
                None => DeviceType::None as u8,
            };
        }
        blob
    }

    /// Lowest unpopulated slot index, if any (§8, "Slot allocation").
    pub fn lowest_free_slot(&self, network: NetworkId) -> Option<u8> {
        (0..16u8).find(|&i| self.net(network).transfer_mask & (1 << i) == 0)
    }

    pub fn create_slot(&mut self, network: NetworkId, device_type: DeviceType, slot: u8) {
        let net = self.net_mut(network);
        net.slots[slot as usize] = match device_type {
            DeviceType::Rf66xx => Some(DeviceSlot::Rf66xx(Rf66xxState::default())),
            DeviceType::None => None,
        };
        if device_type == DeviceType::None {
            net.transfer_mask &= !(1 << slot);
        } else {
            net.transfer_mask |= 1 << slot;
        }
    }

    pub fn destroy_slot(&mut self, network: NetworkId, slot: u8) {
        let net = self.net_mut(network);
        net.slots[slot as usize] = None;
        net.transfer_mask &= !(1 << slot);
    }

    pub fn slot_view(&self, network: NetworkId, slot: u8) -> Option<SlotView> {
        match self.net(network).slots[slot as usize] {
            Some(DeviceSlot::Rf66xx(state)) => Some(SlotView { network, slot, state }),
            None => None,
        }
    }

    /// Apply one decoded register value to a slot (§4.5's dispatch table).
    /// `req_bit`/`ack_bit` come from the transaction's target/ack masks for
    /// this slot and gate the `on_air` update, which happens for every
    /// register, known or not; only the typed-field decode below is gated
    /// on recognising `reg`. Applying the same value twice leaves the slot
    /// in the same state both times (§8, "Cache idempotence").
    pub fn decode_register(
        &mut self,
        network: NetworkId,
        slot: u8,
        reg: u16,
        req_bit: bool,
        ack_bit: bool,
        value: u16,
    ) {
        let Some(DeviceSlot::Rf66xx(state)) = &mut self.net_mut(network).slots[slot as usize] else {
            return;
        };

        // on_air bookkeeping happens for every register, known or not; only
        // the extra typed-field update below is gated on recognising `reg`.
        if req_bit {
            state.on_air = ack_bit;
        }

        match reg {
            ATT_POWER => state.power = (value & 0xFF) as u8,
            ROOM_TEMP => state.room_temp = value,
            SETPOINT_STATUS => {
                state.set_point = (value & 0xFF) as u8;
                state.defrost = value & 0x0200 != 0;
                state.timed = value & 0x0800 != 0;
                state.heater_on = value & 0x1000 != 0;
                state.heater_stopped = value & 0x2000 != 0;
            }
            ERROR_STATUS => {
                state.window_open = value & 0x0002 != 0;
                state.no_temp_sensor = value & 0x0100 != 0;
                state.battery_low = value & 0x1000 != 0;
            }
            ON_OFF => state.enabled = value & 0x0001 != 0,
            SETPOINT_DEFROST => state.set_point_defrost = (value & 0xFF) as u8,
            SETPOINT_NIGHT_DAY => {
                state.set_point_night = (value & 0xFF) as u8;
                state.set_point_day = ((value >> 8) & 0xFF) as u8;
            }
            MODE_TIME => {}
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_from_blob_builds_transfer_mask() {
        let mut cache = DeviceCache::new();
        let mut blob = [0u8; 16];
        blob[0] = DeviceType::Rf66xx as u8;
        blob[3] = DeviceType::Rf66xx as u8;
        cache.init_from_blob(NetworkId::Four, &blob);
        assert_eq!(cache.transfer_mask(NetworkId::Four), 0b1001);
    }

    #[test]
    fn lowest_free_slot_skips_populated() {
        let mut cache = DeviceCache::new();
        cache.create_slot(NetworkId::Five, DeviceType::Rf66xx, 0);
        cache.create_slot(NetworkId::Five, DeviceType::Rf66xx, 1);
        assert_eq!(cache.lowest_free_slot(NetworkId::Five), Some(2));
    }

    #[test]
    fn destroy_slot_clears_mask_bit() {
        let mut cache = DeviceCache::new();
        cache.create_slot(NetworkId::Four, DeviceType::Rf66xx, 5);
        cache.destroy_slot(NetworkId::Four, 5);
        assert_eq!(cache.transfer_mask(NetworkId::Four), 0);
        assert!(cache.slot_view(NetworkId::Four, 5).is_none());
    }

    #[test]
    fn decode_setpoint_status_sets_flags_and_clears_on_req_without_ack() {
        let mut cache = DeviceCache::new();
        cache.create_slot(NetworkId::Four, DeviceType::Rf66xx, 0);
        cache.decode_register(NetworkId::Four, 0, SETPOINT_STATUS, true, true, 0x3A14);
        let view = cache.slot_view(NetworkId::Four, 0).unwrap();
        assert_eq!(view.state.set_point, 0x14);
        assert!(view.state.heater_on);
        assert!(view.state.on_air);

        cache.decode_register(NetworkId::Four, 0, ROOM_TEMP, true, false, 215);
        let view = cache.slot_view(NetworkId::Four, 0).unwrap();
        assert_eq!(view.state.room_temp, 215);
        assert!(!view.state.on_air);
    }

    #[test]
    fn decode_is_idempotent() {
        let mut cache = DeviceCache::new();
        cache.create_slot(NetworkId::Four, DeviceType::Rf66xx, 2);
        cache.decode_register(NetworkId::Four, 2, ERROR_STATUS, true, true, 0x1102);
        let once = cache.slot_view(NetworkId::Four, 2).unwrap().state;
        cache.decode_register(NetworkId::Four, 2, ERROR_STATUS, true, true, 0x1102);
        let twice = cache.slot_view(NetworkId::Four, 2).unwrap().state;
        assert_eq!(once.window_open, twice.window_open);
        assert_eq!(once.battery_low, twice.battery_low);
    }

    #[test]
    fn mode_time_register_is_a_recognised_no_op() {
        let mut cache = DeviceCache::new();
        cache.create_slot(NetworkId::Four, DeviceType::Rf66xx, 0);
        cache.decode_register(NetworkId::Four, 0, MODE_TIME, true, true, 0x1234);
        assert!(cache.slot_view(NetworkId::Four, 0).unwrap().state.on_air);
    }

    #[test]
    fn on_air_updates_even_for_an_unrecognised_register() {
        let mut cache = DeviceCache::new();
        cache.create_slot(NetworkId::Four, DeviceType::Rf66xx, 0);
        cache.decode_register(NetworkId::Four, 0, 0x9999, true, true, 0x1234);
        assert!(cache.slot_view(NetworkId::Four, 0).unwrap().state.on_air);

        cache.decode_register(NetworkId::Four, 0, 0x9999, true, false, 0x1234);
        assert!(!cache.slot_view(NetworkId::Four, 0).unwrap().state.on_air);
    }
}
