//! Kernel module - server infrastructure and dependencies.

pub mod bounded_store;
pub mod deps;
pub mod postgres_store;
pub mod server_kernel;
pub mod service_host;
pub mod test_dependencies;
pub mod timeout;
pub mod traits;

pub use bounded_store::BoundedStore;
pub use deps::{
    AzureGenerator, FallbackContentGenerator, GbpPublisherAdapter, GeminiGenerator,
    OAuthTokenAdapter, ServerDeps,
};
pub use postgres_store::PostgresStore;
pub use server_kernel::ServerKernel;
pub use service_host::{until_cancelled, Service, ServiceHost};
pub use test_dependencies::TestDependencies;
pub use traits::*;
