pub mod collector;
pub mod http;
pub mod logging;
pub mod sources;

#[cfg(test)]
mod test_support;

pub use collector::{collect, AdapterReport, AdapterStatus, CollectionResult};
pub use http::{build_http_client, PoliteClient, RetryOutcome, RetryPolicy};
pub use logging::{init_logging, Logger};
pub use sources::{build_source, build_sources, Source};

pub mod prelude {
    pub use super::sources::Source;
    pub use super::collector::{AdapterStatus, CollectionResult};
    pub use cocoon_core::{Article, Error, Result, SourceKind};
}
