//! SX1231/RFM69 register value enums: modulation, packet framing, filters
//! and DIO routing. One enum per register field, so configuration calls are
//! exhaustively checked rather than passed as raw hex.

/// OP-MODE (0x01) bits 2..4: transceiver operating mode.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum Mode {
    Sleep = 0 << 2,
    Standby = 1 << 2,
    FreqSynth = 2 << 2,
    Transmitter = 3 << 2,
    Receiver = 4 << 2,
}

/// OP-MODE (0x01) bit 6: listen mode, independent of `Mode`.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum ListenMode {
    Off = 0,
    On = 1 << 6,
}

/// IRQ-FLAGS1 (0x27) bits.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum IrqFlags1 {
    SyncAddressMatch = 0x01,
    AutoMode = 0x02,
    Timeout = 0x04,
    Rssi = 0x08,
    PllLock = 0x10,
    TxReady = 0x20,
    RxReady = 0x40,
    ModeReady = 0x80,
}

/// IRQ-FLAGS2 (0x28) bits.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum IrqFlags2 {
    CrcOk = 0x02,
    PayloadReady = 0x04,
    PacketSent = 0x08,
    FifoOverrun = 0x10,
    FifoLevel = 0x20,
    FifoNotEmpty = 0x40,
    FifoFull = 0x80,
}

/// DATA-MODUL (0x02) bits 5..6: data processing mode.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum DataMode {
    Packet = 0x00,
    Continuous = 0x40,
    ContinuousBitSync = 0x60,
}

/// DATA-MODUL (0x02) bit 3: modulation type.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum ModulationType {
    Fsk = 0x00,
    Ook = 0x08,
}

/// DATA-MODUL (0x02) bits 0..1: modulation shaping.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum ModulationShaping {
    Shaping00 = 0x00,
    Shaping01 = 0x01,
    Shaping10 = 0x02,
    Shaping11 = 0x03,
}

/// RX-BW / AFC-BW (0x19/0x1A) bits 5..7: DCC cutoff fraction of RX bandwidth.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum DccCutoff {
    Percent16 = 0x00,
    Percent8 = 0x20,
    Percent4 = 0x40,
    Percent2 = 0x60,
    Percent1 = 0x80,
    Percent0Dot5 = 0xA0,
    Percent0Dot25 = 0xC0,
    Percent0Dot125 = 0xE0,
}

/// RX-BW / AFC-BW bits 0..4: mantissa (bits 3-4) and exponent (bits 0-2),
/// channel filter bandwidth under FSK modulation.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum RxBwFsk {
    Khz2Dot6 = 0b10 << 3 | 7,
    Khz3Dot1 = 0b01 << 3 | 7,
    Khz3Dot9 = 7,
    Khz5Dot2 = 0b10 << 3 | 6,
    Khz6Dot3 = 0b01 << 3 | 6,
    Khz7Dot8 = 6,
    Khz10Dot4 = 0b10 << 3 | 5,
    Khz12Dot5 = 0b01 << 3 | 5,
    Khz15Dot6 = 5,
    Khz20Dot8 = 0b10 << 3 | 4,
    Khz25Dot0 = 0b01 << 3 | 4,
    Khz31Dot3 = 4,
    Khz41Dot7 = 0b10 << 3 | 3,
    Khz50Dot0 = 0b01 << 3 | 3,
    Khz62Dot5 = 3,
    Khz83Dot3 = 0b10 << 3 | 2,
    Khz100Dot0 = 0b01 << 3 | 2,
    Khz125Dot0 = 2,
    Khz166Dot7 = 0b10 << 3 | 1,
    Khz200Dot0 = 0b01 << 3 | 1,
    Khz250Dot0 = 1,
    Khz333Dot3 = 0b10 << 3,
    Khz400Dot0 = 0b01 << 3,
    Khz500Dot0 = 0,
}

/// Same mantissa/exponent layout as [`RxBwFsk`], under OOK modulation.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum RxBwOok {
    Khz1Dot3 = 0b10 << 3 | 7,
    Khz1Dot6 = 0b01 << 3 | 7,
    Khz2Dot0 = 7,
    Khz2Dot6 = 0b10 << 3 | 6,
    Khz3Dot1 = 0b01 << 3 | 6,
    Khz3Dot9 = 6,
    Khz5Dot2 = 0b10 << 3 | 5,
    Khz6Dot3 = 0b01 << 3 | 5,
    Khz7Dot8 = 5,
    Khz10Dot4 = 0b10 << 3 | 4,
    Khz12Dot5 = 0b01 << 3 | 4,
    Khz15Dot6 = 4,
    Khz20Dot8 = 0b10 << 3 | 3,
    Khz25Dot0 = 0b01 << 3 | 3,
    Khz31Dot3 = 3,
    Khz41Dot7 = 0b10 << 3 | 2,
    Khz50Dot0 = 0b01 << 3 | 2,
    Khz62Dot5 = 2,
    Khz83Dot3 = 0b10 << 3 | 1,
    Khz100Dot0 = 0b01 << 3 | 1,
    Khz125Dot0 = 1,
    Khz166Dot7 = 0b10 << 3,
    Khz200Dot0 = 0b01 << 3,
    Khz250Dot0 = 0,
}

/// One of the six DIO pins. The value is its bit offset within the pair of
/// DIO-mapping registers (§4.3.2 of the design notes): DIO0 sits highest.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum DioPin {
    Dio0 = 14,
    Dio1 = 12,
    Dio2 = 10,
    Dio3 = 8,
    Dio4 = 6,
    Dio5 = 4,
}

/// Two-bit value written at a DIO pin's bit offset; meaning depends on pin
/// and operating mode (datasheet table 21).
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum DioType {
    Type00 = 0b00,
    Type01 = 0b01,
    Type10 = 0b10,
    Type11 = 0b11,
}

/// Which operating mode(s) a DIO mapping entry is active for.
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum DioRole {
    Rx,
    Tx,
    Both,
    None,
}

impl DioRole {
    pub fn active_in_tx(&self) -> bool {
        matches!(self, DioRole::Tx | DioRole::Both)
    }

    pub fn active_in_rx(&self) -> bool {
        matches!(self, DioRole::Rx | DioRole::Both)
    }
}

/// DIO-MAPPING2 (0x26) bits 0..2: clock output on the CLKOUT pin.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum ClkOut {
    Fxosc = 0,
    FxoscDiv2 = 1,
    FxoscDiv4 = 2,
    FxoscDiv8 = 3,
    FxoscDiv16 = 4,
    FxoscDiv32 = 5,
    Rc = 6,
    Off = 7,
}

/// PACKET-CONFIG2 (0x3D) bits 4..7: minimum number of bit periods between
/// packets before Rx restarts, in powers of two.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum InterPacketRxDelay {
    Bits1 = 0x00,
    Bits2 = 0x10,
    Bits4 = 0x20,
    Bits8 = 0x30,
    Bits16 = 0x40,
    Bits32 = 0x50,
    Bits64 = 0x60,
    Bits128 = 0x70,
    Bits256 = 0x80,
    Bits512 = 0x90,
    Bits1024 = 0xA0,
    Bits2048 = 0xB0,
}

/// PACKET-CONFIG1 (0x37) bits 1..2: address-based filtering.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum PacketFiltering {
    None = 0x00,
    Address = 0x02,
    Broadcast = 0x04,
}

/// PACKET-CONFIG1 (0x37) bits 5..6: DC-free encoding.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum PacketDcFree {
    None = 0x00,
    Manchester = 0x20,
    Whitening = 0x40,
}

/// PACKET-CONFIG1 (0x37) bit 7: fixed vs. variable payload length.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum PacketFormat {
    Fixed = 0x00,
    Variable = 0x80,
}

/// TEST-LNA (0x58): receiver sensitivity boost.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum SensitivityBoost {
    Normal = 0x1B,
    HighSensitivity = 0x2D,
}

/// TEST-DAGC (0x6F): continuous DAGC tuning, to be used together with AFC
/// low-beta-on when AfcAuto is enabled.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum ContinuousDagc {
    Normal = 0x00,
    ImprovedMarginAfcLowBetaOn1 = 0x20,
    ImprovedMarginAfcLowBetaOn0 = 0x30,
}
