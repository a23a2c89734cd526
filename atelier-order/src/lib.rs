pub mod finalizer;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod repository;

pub use finalizer::{CheckoutFinalizer, FinalizeReport};
pub use memory::MemoryOrders;
pub use models::{Order, OrderLine, OrderStatus};
pub use orchestrator::{MockPaymentAdapter, PaymentOrchestrator};
pub use repository::OrderRepository;
