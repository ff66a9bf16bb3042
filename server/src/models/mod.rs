pub mod checkout;
pub mod event;
pub mod ticket;
pub mod transaction;
pub mod user;

pub use checkout::{CheckoutHold, CheckoutLine, CheckoutRequest, HoldStatus};
pub use event::{Event, EventWithTiers, NewEvent};
pub use ticket::{CapacityCheck, NewTier, OwnedTicket, Ticket, TicketTier, MAX_UNIT_PRICE};
pub use transaction::{Receipt, TransactionGroup};
pub use user::{NewUser, User};
