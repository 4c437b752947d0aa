//! The ingestion saga engine and its supporting builders.

pub mod extractor;
pub mod graph_builder;
pub mod raptor;
pub mod resolver;
pub mod saga;

pub use extractor::GraphExtractor;
pub use graph_builder::GraphBuilder;
pub use raptor::RaptorBuilder;
pub use resolver::EntityResolver;
pub use saga::SagaOrchestrator;
