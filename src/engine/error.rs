use ulid::Ulid;

use crate::model::Status;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("no reservation for payment order {0}")]
    OrderNotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("you already have a pending request for this slot ({existing})")]
    DuplicateHold { existing: Ulid },
    #[error("slot already booked by reservation {winner}")]
    SlotTaken { winner: Ulid },
    #[error("reservation {id}: cannot move from {from} to {to}")]
    InvalidTransition { id: Ulid, from: Status, to: Status },
    #[error("reservation {id} already has payment order {attached}")]
    Conflict { id: Ulid, attached: String },
    #[error("this slot was just booked; refund initiated (reservation {id} is {status}, order {order_id})")]
    PaymentOnRejectedReservation {
        id: Ulid,
        order_id: String,
        status: Status,
    },
    #[error("user {actor} may not act on {target}")]
    Forbidden { actor: Ulid, target: Ulid },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("payment gateway error: {0}")]
    Gateway(String),
    #[error("journal error: {0}")]
    WalError(String),
}
