//! SQLite persistence for the swarm coordinator.

pub mod connection;
pub mod migrations;
pub mod swarm_repository;

pub use connection::{
    create_pool, create_test_pool, open_existing_pool, verify_connection, ConnectionError,
    PoolConfig,
};
pub use migrations::{MigrationError, SwarmMigrator};
pub use swarm_repository::SwarmRepository;
