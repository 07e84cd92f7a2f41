//! Per-layer error enums, composed with `From` so `?` works end to end from
//! the controller down through the transaction engine to the radio driver
//! (§7).

use crate::shared::RadioError;

/// The frame codec currently rejects nothing; kept as a marker type so a
/// future validation (e.g. a length sanity check) has an error to return.
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum FrameError {}

/// Transactions treat "no PIN observed" and "not acked" as ordinary mesh
/// outcomes, not errors: `run_pair`/`run_unpair`/`run_read`/`run_write`
/// report them through `PairOutcome`/`AckOutcome`/`ReadOutcome` fields
/// instead, since a silent device is expected traffic on a lossy half-duplex
/// mesh. This only wraps the one failure mode that really is exceptional.
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum TransactionError<SpiE> {
    Radio(RadioError<SpiE>),
}

impl<SpiE> From<RadioError<SpiE>> for TransactionError<SpiE> {
    fn from(e: RadioError<SpiE>) -> Self {
        TransactionError::Radio(e)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum ControllerError<SpiE> {
    Busy,
    InvalidNetwork,
    InvalidSlot,
    Transaction(TransactionError<SpiE>),
}

impl<SpiE> From<TransactionError<SpiE>> for ControllerError<SpiE> {
    fn from(e: TransactionError<SpiE>) -> Self {
        ControllerError::Transaction(e)
    }
}

impl<SpiE> From<RadioError<SpiE>> for ControllerError<SpiE> {
    fn from(e: RadioError<SpiE>) -> Self {
        ControllerError::Transaction(TransactionError::Radio(e))
    }
}
