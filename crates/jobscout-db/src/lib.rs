pub mod company_repository;
pub mod config;
pub mod database;
pub mod listing_repository;
pub mod queue_repository;
pub mod source_repository;

pub use company_repository::CompanyRepository;
pub use config::DatabaseConfig;
pub use database::Database;
pub use listing_repository::{ListingRepository, MatchRepository};
pub use queue_repository::QueueRepository;
pub use source_repository::SourceRepository;
