//! Transaction engine: send-with-retry, response merging, and the five
//! application transactions built on top of the frame codec (§4.4).
//!
//! A transaction owns the 64-byte frame buffer for its entire lifetime and
//! hands it back (inside whichever outcome struct is appropriate) when
//! done; nothing here keeps a `static` copy around between calls.

use defmt::{debug, trace};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::error::TransactionError;
use crate::frame::{self, FrameBuf, MsgType, PairState, FRAME_CAP};
use crate::{Radio, MAX_PAYLOAD};

const SEND_INTERVAL_MS: u32 = 20;
const MERGE_POLL_INTERVAL_MS: u32 = 5;

#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum TransactionKind {
    PairOpen,
    PairPinned,
    Unpair,
    Read,
    Write,
    Ping,
}

/// Initial retry count per §4.4's table.
pub fn initial_retry(kind: TransactionKind) -> u8 {
    match kind {
        TransactionKind::PairOpen => 4,
        TransactionKind::PairPinned => 4,
        TransactionKind::Unpair => 4,
        TransactionKind::Read => 2,
        TransactionKind::Write => 4,
        TransactionKind::Ping => 1,
    }
}

/// Milliseconds to listen for mesh responses after the send loop, as a pure
/// function of transaction kind and device count so it is unit-testable
/// without a real delay (§9, "Variable-wait heuristic").
pub fn transaction_wait(kind: TransactionKind, devices: u8) -> u32 {
    let devices = devices as u32;
    match kind {
        TransactionKind::PairOpen => 5000,
        TransactionKind::PairPinned => (devices + 1) * 4 * 20,
        TransactionKind::Unpair | TransactionKind::Read | TransactionKind::Write | TransactionKind::Ping => {
            devices * 4 * 20
        }
    }
}

/// Compare the bytes before the payload; if they match, accept the
/// incoming frame's retry byte and OR-merge everything after it into
/// `local`, provided the incoming retry is strictly greater than the
/// current one (§4.4 merge rule, §8 scenario 3).
pub fn merge_response(local: &mut FrameBuf, incoming: &FrameBuf, payload_index: usize) -> bool {
    if local[0..payload_index] != incoming[0..payload_index] {
        return false;
    }
    let incoming_retry = incoming[payload_index] & 0x0F;
    let local_retry = local[payload_index] & 0x0F;
    if incoming_retry <= local_retry {
        return false;
    }
    let pkt_len = local[frame::IDX_PKT_LEN] as usize;
    local[payload_index] = incoming[payload_index];
    for i in payload_index + 1..pkt_len {
        local[i] |= incoming[i];
    }
    true
}

/// Send `buf[..pkt_len]` once per remaining retry, recomputing the CRC
/// before each send (retry and ack bytes mutate) and delaying
/// [`SEND_INTERVAL_MS`] between sends.
fn run_send_loop<SPI, CS, SpiE, CsE, D>(
    radio: &mut Radio<SPI, CS, D>,
    buf: &mut FrameBuf,
    payload_index: usize,
) -> Result<(), TransactionError<SpiE>>
where
    SPI: SpiBus<u8, Error = SpiE>,
    CS: OutputPin<Error = CsE>,
    D: DelayNs,
{
    let mut first = true;
    loop {
        if !first {
            radio.delay_ms(SEND_INTERVAL_MS);
        }
        first = false;

        frame::set_crc(buf);
        let pkt_len = buf[frame::IDX_PKT_LEN] as usize;
        trace!("transaction: sending frame");
        radio.transmit(&buf[..pkt_len])?;

        frame::dec_retry(buf, payload_index);
        if buf[payload_index] & 0x0F == 0 {
            break;
        }
    }
    Ok(())
}

/// Switch to receive and merge every frame observed over `wait_ms`,
/// polling every [`MERGE_POLL_INTERVAL_MS`].
fn run_listen_loop<SPI, CS, SpiE, CsE, D>(
    radio: &mut Radio<SPI, CS, D>,
    buf: &mut FrameBuf,
    payload_index: usize,
    wait_ms: u32,
) -> Result<(), TransactionError<SpiE>>
where
    SPI: SpiBus<u8, Error = SpiE>,
    CS: OutputPin<Error = CsE>,
    D: DelayNs,
{
    radio.receive_begin()?;
    let mut scratch = [0u8; MAX_PAYLOAD];
    let mut remaining = wait_ms;
    while remaining > 0 {
        let len = radio.check_received(&mut scratch)?;
        if len > 0 {
            let mut incoming: FrameBuf = [0u8; FRAME_CAP];
            incoming[..len].copy_from_slice(&scratch[..len]);
            if merge_response(buf, &incoming, payload_index) {
                debug!("transaction: merged a response");
            }
        }
        radio.delay_ms(MERGE_POLL_INTERVAL_MS);
        remaining = remaining.saturating_sub(MERGE_POLL_INTERVAL_MS);
    }
    Ok(())
}

fn ack_mask(buf: &FrameBuf, payload_index: usize) -> u16 {
    u16::from_le_bytes([buf[payload_index + 3], buf[payload_index + 4]])
}

fn data_words(buf: &FrameBuf, payload_index: usize, slot_count: u8) -> [u16; 16] {
    let mut words = [0u16; 16];
    let data_start = payload_index + 12;
    for i in 0..slot_count as usize {
        words[i] = u16::from_le_bytes([buf[data_start + 2 * i], buf[data_start + 2 * i + 1]]);
    }
    words
}

#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct PairOutcome {
    pub success: bool,
    pub pin: u16,
    pub slot: u8,
}

#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct AckOutcome {
    pub ack_mask: u16,
}

#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct ReadOutcome {
    pub ack_mask: u16,
    pub data: [u16; 16],
    pub slot_count: u8,
}

/// Run both rounds of the pairing algorithm (§4.4) against the lowest free
/// slot in `transfer_mask`. `slot` is the caller's already-chosen target
/// (lowest zero bit of `transfer_mask`), so the caller remains the single
/// source of truth for the pairing-quirk gate (§4.1, §9).
#[allow(clippy::too_many_arguments)]
pub fn run_pair<SPI, CS, SpiE, CsE, D>(
    radio: &mut Radio<SPI, CS, D>,
    buf: &mut FrameBuf,
    msg_no: &mut u8,
    device_id: u32,
    network: u8,
    transfer_mask: u16,
    slot: u8,
    msg_id: u16,
) -> Result<PairOutcome, TransactionError<SpiE>>
where
    SPI: SpiBus<u8, Error = SpiE>,
    CS: OutputPin<Error = CsE>,
    D: DelayNs,
{
    let quirk = slot % 2 == 1 && transfer_mask != 0;
    let slot_byte = frame::pairing_slot_byte(slot, quirk);

    frame::init_frame(buf, device_id, network);
    let payload_index = frame::prepare_header(buf, msg_no, MsgType::Pairing, 0, 0, &[], msg_id);
    frame::set_message_retrans(buf, payload_index, initial_retry(TransactionKind::PairOpen), 0);
    frame::set_pairing_data(buf, payload_index, slot_byte, 0, PairState::Open);

    run_send_loop(radio, buf, payload_index)?;
    run_listen_loop(radio, buf, payload_index, transaction_wait(TransactionKind::PairOpen, 0))?;

    let pin = u16::from_le_bytes([buf[payload_index + 9], buf[payload_index + 10]]);
    if pin == 0 {
        debug!("pairing round 1: no PIN observed");
        return Ok(PairOutcome { success: false, pin: 0, slot });
    }

    let devices = transfer_mask.count_ones() as u8;

    frame::init_frame(buf, device_id, network);
    let payload_index = frame::prepare_header(buf, msg_no, MsgType::Pairing, 0, 0, &[], msg_id);
    frame::set_message_retrans(buf, payload_index, initial_retry(TransactionKind::PairPinned), 0);
    frame::set_pairing_data(buf, payload_index, slot_byte, pin, PairState::Pinned);

    run_send_loop(radio, buf, payload_index)?;
    run_listen_loop(
        radio,
        buf,
        payload_index,
        transaction_wait(TransactionKind::PairPinned, devices),
    )?;

    let acked = ack_mask(buf, payload_index) & (1 << slot) != 0;
    Ok(PairOutcome { success: acked, pin, slot })
}

/// Standard write of `action=RESET`, register `0xE000`, targeting only
/// `slot`'s bit (§4.4 unpairing algorithm). The caller clears the slot and
/// transfer-mask bit locally regardless of the returned ack.
pub fn run_unpair<SPI, CS, SpiE, CsE, D>(
    radio: &mut Radio<SPI, CS, D>,
    buf: &mut FrameBuf,
    msg_no: &mut u8,
    device_id: u32,
    network: u8,
    slot: u8,
) -> Result<AckOutcome, TransactionError<SpiE>>
where
    SPI: SpiBus<u8, Error = SpiE>,
    CS: OutputPin<Error = CsE>,
    D: DelayNs,
{
    let target_mask: u16 = 1 << slot;
    frame::init_frame(buf, device_id, network);
    let payload_index = frame::prepare_header(buf, msg_no, MsgType::Standard, 0, 0, &[], 0);
    frame::set_message_retrans(buf, payload_index, initial_retry(TransactionKind::Unpair), target_mask);
    frame::set_unpair(buf, payload_index, target_mask);

    run_send_loop(radio, buf, payload_index)?;
    run_listen_loop(radio, buf, payload_index, transaction_wait(TransactionKind::Unpair, 1))?;

    Ok(AckOutcome { ack_mask: ack_mask(buf, payload_index) })
}

/// Read transaction: `slot_count = highest_set_bit(target_mask) + 1`
/// (§4.4). `transfer_mask` is the full set of reachable slots and feeds the
/// wait-duration formula; `target_mask` is the (sub)set this read
/// addresses.
#[allow(clippy::too_many_arguments)]
pub fn run_read<SPI, CS, SpiE, CsE, D>(
    radio: &mut Radio<SPI, CS, D>,
    buf: &mut FrameBuf,
    msg_no: &mut u8,
    device_id: u32,
    network: u8,
    transfer_mask: u16,
    target_mask: u16,
    reg_high: u8,
    reg_low: u8,
) -> Result<ReadOutcome, TransactionError<SpiE>>
where
    SPI: SpiBus<u8, Error = SpiE>,
    CS: OutputPin<Error = CsE>,
    D: DelayNs,
{
    let slot_count = 16 - target_mask.leading_zeros() as u8;
    let devices = transfer_mask.count_ones() as u8;

    frame::init_frame(buf, device_id, network);
    let payload_index = frame::prepare_header(buf, msg_no, MsgType::Standard, 0, 0, &[], 0);
    frame::set_message_retrans(buf, payload_index, initial_retry(TransactionKind::Read), transfer_mask);
    frame::set_register_read(buf, payload_index, target_mask, reg_high, reg_low, slot_count);

    run_send_loop(radio, buf, payload_index)?;
    run_listen_loop(radio, buf, payload_index, transaction_wait(TransactionKind::Read, devices))?;

    Ok(ReadOutcome {
        ack_mask: ack_mask(buf, payload_index),
        data: data_words(buf, payload_index, slot_count),
        slot_count,
    })
}

/// Write transaction. `values[i]` is used only where bit `i` of
/// `target_mask` is set; the frame codec itself zeroes the rest (§4.1).
#[allow(clippy::too_many_arguments)]
pub fn run_write<SPI, CS, SpiE, CsE, D>(
    radio: &mut Radio<SPI, CS, D>,
    buf: &mut FrameBuf,
    msg_no: &mut u8,
    device_id: u32,
    network: u8,
    transfer_mask: u16,
    target_mask: u16,
    reg_high: u8,
    reg_low: u8,
    values: &[u16],
) -> Result<AckOutcome, TransactionError<SpiE>>
where
    SPI: SpiBus<u8, Error = SpiE>,
    CS: OutputPin<Error = CsE>,
    D: DelayNs,
{
    let slot_count = 16 - target_mask.leading_zeros() as u8;
    let devices = transfer_mask.count_ones() as u8;

    frame::init_frame(buf, device_id, network);
    let payload_index = frame::prepare_header(buf, msg_no, MsgType::Standard, 0, 0, &[], 0);
    frame::set_message_retrans(buf, payload_index, initial_retry(TransactionKind::Write), transfer_mask);
    frame::set_register_write(buf, payload_index, target_mask, reg_high, reg_low, slot_count, values);

    run_send_loop(radio, buf, payload_index)?;
    run_listen_loop(radio, buf, payload_index, transaction_wait(TransactionKind::Write, devices))?;

    Ok(AckOutcome { ack_mask: ack_mask(buf, payload_index) })
}

/// Temperature broadcast: a ping (`action=NONE`) carrying the extended
/// header's three temperature bytes, targeting every populated slot
/// (§4.4).
pub fn run_temperature_broadcast<SPI, CS, SpiE, CsE, D>(
    radio: &mut Radio<SPI, CS, D>,
    buf: &mut FrameBuf,
    msg_no: &mut u8,
    device_id: u32,
    network: u8,
    transfer_mask: u16,
    outdoor: bool,
    centi_celsius: i16,
) -> Result<AckOutcome, TransactionError<SpiE>>
where
    SPI: SpiBus<u8, Error = SpiE>,
    CS: OutputPin<Error = CsE>,
    D: DelayNs,
{
    let devices = transfer_mask.count_ones() as u8;
    let ext = frame::temp_ext_header(outdoor, centi_celsius);

    frame::init_frame(buf, device_id, network);
    let payload_index = frame::prepare_header(buf, msg_no, MsgType::Sensor, 0, 0, &ext, 0);
    frame::set_message_retrans(buf, payload_index, initial_retry(TransactionKind::Ping), transfer_mask);
    frame::set_ping(buf, payload_index, transfer_mask);

    run_send_loop(radio, buf, payload_index)?;
    run_listen_loop(radio, buf, payload_index, transaction_wait(TransactionKind::Ping, devices))?;

    Ok(AckOutcome { ack_mask: ack_mask(buf, payload_index) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_formula_pair_open_is_fixed() {
        assert_eq!(transaction_wait(TransactionKind::PairOpen, 0), 5000);
        assert_eq!(transaction_wait(TransactionKind::PairOpen, 9), 5000);
    }

    #[test]
    fn wait_formula_scales_with_devices() {
        assert_eq!(transaction_wait(TransactionKind::Read, 4), 4 * 4 * 20);
        assert_eq!(transaction_wait(TransactionKind::PairPinned, 3), (3 + 1) * 4 * 20);
    }

    #[test]
    fn initial_retry_matches_table() {
        assert_eq!(initial_retry(TransactionKind::Read), 2);
        assert_eq!(initial_retry(TransactionKind::Ping), 1);
        assert_eq!(initial_retry(TransactionKind::Write), 4);
    }

    #[test]
    fn scenario_response_merge() {
        let mut buf = [0u8; FRAME_CAP];
        frame::init_frame(&mut buf, 0x123456, 0x04);
        let mut msg_no = 1u8;
        let payload_index =
            frame::prepare_header(&mut buf, &mut msg_no, MsgType::Standard, 0, 0, &[], 0);
        frame::set_message_retrans(&mut buf, payload_index, 4, 0x000F);
        frame::set_register_read(&mut buf, payload_index, 0x000F, 0x15, 0x11, 4);

        let mut first = buf;
        first[payload_index] = (first[payload_index] & 0xF0) | 3;
        let data_start = payload_index + 12;
        for (i, word) in [0x0001u16, 0x0002, 0x0003, 0x0004].iter().enumerate() {
            let bytes = word.to_le_bytes();
            first[data_start + 2 * i] = bytes[0];
            first[data_start + 2 * i + 1] = bytes[1];
        }
        assert!(merge_response(&mut buf, &first, payload_index));
        assert_eq!(data_words(&buf, payload_index, 4)[0..4], [0x0001, 0x0002, 0x0003, 0x0004]);

        let mut second = buf;
        second[payload_index] = (second[payload_index] & 0xF0) | 3;
        second[data_start] = 0x00;
        second[data_start + 1] = 0x01;
        assert!(!merge_response(&mut buf, &second, payload_index));
        assert_eq!(data_words(&buf, payload_index, 4)[0..4], [0x0001, 0x0002, 0x0003, 0x0004]);
    }

    #[test]
    fn merge_ignores_frames_with_mismatched_header() {
        let mut buf = [0u8; FRAME_CAP];
        frame::init_frame(&mut buf, 0x123456, 0x04);
        let mut msg_no = 1u8;
        let payload_index =
            frame::prepare_header(&mut buf, &mut msg_no, MsgType::Standard, 0, 0, &[], 0);
        frame::set_message_retrans(&mut buf, payload_index, 4, 0x0001);

        let mut other = buf;
        other[frame::IDX_DEVICE_ID] ^= 0xFF;
        assert!(!merge_response(&mut buf, &other, payload_index));
    }
}

/// Drives the real transaction algorithms against a fake SPI/GPIO bus
/// (`embedded-hal-mock`'s `eh1` mocks), exercising `run_pair`/`run_unpair`
/// through an actual `Radio` and actual `run_send_loop`/`run_listen_loop`
/// rather than calling the pure helpers directly. One entry per register
/// transaction the driver performs, built with small helpers below so the
/// expectation lists mirror `status.rs`/`spi_interface.rs` call-for-call.
#[cfg(test)]
mod fake_bus_tests {
    use std::vec::Vec;

    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State as PinState, Transaction as PinTransaction};
    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};

    use crate::params::{ListenMode, Mode};
    use crate::spi_interface::Interface;

    use super::*;

    const REG_FIFO: u8 = 0x00;
    const REG_OP_MODE: u8 = 0x01;
    const REG_DIO_MAPPING1: u8 = 0x25;
    const REG_DIO_MAPPING2: u8 = 0x26;
    const REG_IRQ_FLAGS1: u8 = 0x27;
    const REG_IRQ_FLAGS2: u8 = 0x28;
    const WRITE_BIT: u8 = 0x80;

    const MODE_STANDBY: u8 = Mode::Standby as u8;
    const MODE_TRANSMITTER: u8 = Mode::Transmitter as u8;
    const MODE_RECEIVER: u8 = Mode::Receiver as u8;

    fn expect_write_reg(spi: &mut Vec<SpiTransaction>, cs: &mut Vec<PinTransaction>, addr: u8, val: u8) {
        cs.push(PinTransaction::set(PinState::Low));
        spi.push(SpiTransaction::write_vec(std::vec![addr | WRITE_BIT, val]));
        cs.push(PinTransaction::set(PinState::High));
    }

    fn expect_read_reg(spi: &mut Vec<SpiTransaction>, cs: &mut Vec<PinTransaction>, addr: u8, response: u8) {
        cs.push(PinTransaction::set(PinState::Low));
        spi.push(SpiTransaction::transfer_in_place(std::vec![addr, 0x00], std::vec![0x00, response]));
        cs.push(PinTransaction::set(PinState::High));
    }

    /// A real `set_mode` call, which always rewrites DIO routing ahead of
    /// the OP-MODE register (empty `dio_table` means both DIO bytes are
    /// always `0x00`/`ClkOut::Off`).
    fn expect_mode_change(spi: &mut Vec<SpiTransaction>, cs: &mut Vec<PinTransaction>, mode_byte: u8) {
        expect_write_reg(spi, cs, REG_DIO_MAPPING1, 0x00);
        expect_write_reg(spi, cs, REG_DIO_MAPPING2, 0x07);
        expect_write_reg(spi, cs, REG_OP_MODE, mode_byte);
    }

    fn expect_write_fifo(spi: &mut Vec<SpiTransaction>, cs: &mut Vec<PinTransaction>, payload: &[u8]) {
        cs.push(PinTransaction::set(PinState::Low));
        spi.push(SpiTransaction::write_vec(std::vec![REG_FIFO | WRITE_BIT, payload.len() as u8]));
        spi.push(SpiTransaction::write_vec(payload.to_vec()));
        cs.push(PinTransaction::set(PinState::High));
    }

    /// One `Radio::transmit` call: Standby (no-op on the very first send,
    /// since the radio already starts there), ModeReady wait, FIFO burst,
    /// Transmitter, PacketSent wait.
    fn expect_transmit(
        spi: &mut Vec<SpiTransaction>,
        cs: &mut Vec<PinTransaction>,
        is_first_send: bool,
        payload: &[u8],
    ) {
        if !is_first_send {
            expect_mode_change(spi, cs, MODE_STANDBY);
        }
        expect_read_reg(spi, cs, REG_IRQ_FLAGS1, 0x80); // ModeReady
        expect_write_fifo(spi, cs, payload);
        expect_mode_change(spi, cs, MODE_TRANSMITTER);
        expect_read_reg(spi, cs, REG_IRQ_FLAGS2, 0x08); // PacketSent
    }

    /// `run_send_loop`'s full retry sequence for one round: `initial_retry`
    /// sends, retry nibble counting down from its starting value.
    fn expect_send_loop(
        spi: &mut Vec<SpiTransaction>,
        cs: &mut Vec<PinTransaction>,
        model: &FrameBuf,
        payload_index: usize,
        retry_start: u8,
    ) {
        for (k, retry) in (1..=retry_start).rev().enumerate() {
            let mut b = *model;
            b[payload_index] = (b[payload_index] & 0xF0) | (retry & 0x0F);
            frame::set_crc(&mut b);
            let pkt_len = b[frame::IDX_PKT_LEN] as usize;
            expect_transmit(spi, cs, k == 0, &b[..pkt_len]);
        }
    }

    /// `receive_begin`'s unconditional Standby-then-Receiver pair.
    fn expect_receive_begin(spi: &mut Vec<SpiTransaction>, cs: &mut Vec<PinTransaction>) {
        expect_mode_change(spi, cs, MODE_STANDBY);
        expect_mode_change(spi, cs, MODE_RECEIVER);
    }

    /// One idle `check_received` poll: PayloadReady comes back clear, no
    /// FIFO access.
    fn expect_listen_miss(spi: &mut Vec<SpiTransaction>, cs: &mut Vec<PinTransaction>) {
        expect_read_reg(spi, cs, REG_IRQ_FLAGS2, 0x00);
    }

    /// One `check_received` poll that finds a frame: PayloadReady set,
    /// Standby, two-part FIFO read (length, then body), back to Receiver.
    fn expect_listen_hit(spi: &mut Vec<SpiTransaction>, cs: &mut Vec<PinTransaction>, frame: &[u8]) {
        expect_read_reg(spi, cs, REG_IRQ_FLAGS2, 0x04); // PayloadReady
        expect_mode_change(spi, cs, MODE_STANDBY);
        cs.push(PinTransaction::set(PinState::Low));
        spi.push(SpiTransaction::transfer_in_place(
            std::vec![REG_FIFO, 0x00],
            std::vec![0x00, frame.len() as u8],
        ));
        spi.push(SpiTransaction::transfer_in_place(
            std::vec![0u8; frame.len()],
            frame.to_vec(),
        ));
        cs.push(PinTransaction::set(PinState::High));
        expect_mode_change(spi, cs, MODE_RECEIVER);
    }

    fn new_radio(spi: Vec<SpiTransaction>, cs: Vec<PinTransaction>) -> Radio<SpiMock<u8>, PinMock, NoopDelay> {
        Radio {
            interface: Interface::new(SpiMock::new(&spi), PinMock::new(&cs)),
            delay: NoopDelay::new(),
            mode: Mode::Standby,
            listen_mode: ListenMode::Off,
            dio_table: [None; 8],
        }
    }

    fn finish(mut radio: Radio<SpiMock<u8>, PinMock, NoopDelay>) {
        radio.interface.spi.done();
        radio.interface.cs.done();
    }

    /// §8's "Slot allocation"/"Pairing quirk" property, driven through the
    /// real send/listen loop rather than the pure `pairing_slot_byte`
    /// helper: an odd slot in an already-populated network must carry the
    /// `0x10` quirk bit on every frame actually transmitted, and a round
    /// that never hears a PIN back must report failure without touching
    /// round two.
    #[test]
    fn run_pair_applies_the_quirk_and_reports_silence_through_a_real_loop() {
        const DEVICE_ID: u32 = 0x123456;
        const NETWORK: u8 = 4;
        const TRANSFER_MASK: u16 = 0b0111; // three devices already paired
        const SLOT: u8 = 3; // odd + populated network -> quirk applies
        const MSG_ID: u16 = 0x1111;

        let mut model_msg_no = 1u8;
        let mut model: FrameBuf = [0u8; FRAME_CAP];
        frame::init_frame(&mut model, DEVICE_ID, NETWORK);
        let payload_index =
            frame::prepare_header(&mut model, &mut model_msg_no, MsgType::Pairing, 0, 0, &[], MSG_ID);
        frame::set_message_retrans(&mut model, payload_index, initial_retry(TransactionKind::PairOpen), 0);
        let slot_byte = frame::pairing_slot_byte(SLOT, SLOT % 2 == 1 && TRANSFER_MASK != 0);
        assert_eq!(slot_byte, 0x13, "quirk bit must be set for an odd slot in a populated network");
        frame::set_pairing_data(&mut model, payload_index, slot_byte, 0, PairState::Open);

        let mut spi = Vec::new();
        let mut cs = Vec::new();
        expect_send_loop(&mut spi, &mut cs, &model, payload_index, initial_retry(TransactionKind::PairOpen));
        expect_receive_begin(&mut spi, &mut cs);
        for _ in 0..(transaction_wait(TransactionKind::PairOpen, 0) / MERGE_POLL_INTERVAL_MS) {
            expect_listen_miss(&mut spi, &mut cs);
        }

        let mut radio = new_radio(spi, cs);
        let mut buf: FrameBuf = [0u8; FRAME_CAP];
        let mut msg_no = 1u8;
        let outcome = run_pair(&mut radio, &mut buf, &mut msg_no, DEVICE_ID, NETWORK, TRANSFER_MASK, SLOT, MSG_ID)
            .expect("fake bus never returns a transport error");

        assert!(!outcome.success);
        assert_eq!(outcome.pin, 0);
        assert_eq!(outcome.slot, SLOT);
        assert_eq!(buf[payload_index + 7], slot_byte, "quirked slot byte must reach the transmitted frame");

        finish(radio);
    }

    /// `merge_response` exercised through a real `run_listen_loop`: a
    /// delayed ack frame arriving mid-window gets OR-merged into the
    /// transaction's own buffer, and the transaction reports it.
    #[test]
    fn run_unpair_merges_a_delayed_ack_through_a_real_listen_loop() {
        const DEVICE_ID: u32 = 0x123456;
        const NETWORK: u8 = 4;
        const SLOT: u8 = 2;
        const TARGET_MASK: u16 = 1 << SLOT;

        let mut model_msg_no = 1u8;
        let mut model: FrameBuf = [0u8; FRAME_CAP];
        frame::init_frame(&mut model, DEVICE_ID, NETWORK);
        let payload_index =
            frame::prepare_header(&mut model, &mut model_msg_no, MsgType::Standard, 0, 0, &[], 0);
        frame::set_message_retrans(&mut model, payload_index, initial_retry(TransactionKind::Unpair), TARGET_MASK);
        frame::set_unpair(&mut model, payload_index, TARGET_MASK);
        let pkt_len = model[frame::IDX_PKT_LEN] as usize;

        // The ack frame: same header as ours (required for the merge's
        // equality check), a fresh retry nibble, and the ack-mask bits set.
        let mut ack_frame = model;
        ack_frame[payload_index] = 5;
        let ack_bytes = TARGET_MASK.to_le_bytes();
        ack_frame[payload_index + 3] = ack_bytes[0];
        ack_frame[payload_index + 4] = ack_bytes[1];

        let wait_ms = transaction_wait(TransactionKind::Unpair, 1);
        let iterations = wait_ms / MERGE_POLL_INTERVAL_MS;

        let mut spi = Vec::new();
        let mut cs = Vec::new();
        expect_send_loop(&mut spi, &mut cs, &model, payload_index, initial_retry(TransactionKind::Unpair));
        expect_receive_begin(&mut spi, &mut cs);
        for i in 0..iterations {
            if i == 0 {
                expect_listen_hit(&mut spi, &mut cs, &ack_frame[..pkt_len]);
            } else {
                expect_listen_miss(&mut spi, &mut cs);
            }
        }

        let mut radio = new_radio(spi, cs);
        let mut buf: FrameBuf = [0u8; FRAME_CAP];
        let mut msg_no = 1u8;
        let outcome = run_unpair(&mut radio, &mut buf, &mut msg_no, DEVICE_ID, NETWORK, SLOT)
            .expect("fake bus never returns a transport error");

        assert_eq!(outcome.ack_mask, TARGET_MASK);

        finish(radio);
    }
}
