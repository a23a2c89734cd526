pub mod cache;
pub mod cart;
pub mod client;
pub mod countdown;
pub mod models;
pub mod reconcile;

pub use cache::CartCache;
pub use cart::Cart;
pub use client::{DirectReservationApi, ReservationApi};
pub use countdown::{CountdownConfig, CountdownTicker};
pub use models::{CartItem, CartNotice, CountdownState, Urgency};
pub use reconcile::Reconciler;
