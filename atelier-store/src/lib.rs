pub mod app_config;
pub mod database;
pub mod events;
pub mod order_repo;
pub mod product_repo;
pub mod redis_repo;
pub mod reservation_repo;

pub use database::DbClient;
pub use events::EventProducer;
pub use order_repo::PgOrderRepository;
pub use product_repo::PgProductRepository;
pub use redis_repo::RedisClient;
pub use reservation_repo::PgReservationRepository;
