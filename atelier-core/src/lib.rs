pub mod error;
pub mod notify;
pub mod payment;
pub mod repository;
pub mod reservation;
pub mod session;

pub use error::StoreError;
pub use reservation::{Reservation, ReservationStatus, SweepSummary};
pub use session::SessionId;
