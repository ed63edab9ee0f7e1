// Searchwire - an Elasticsearch and OpenSearch client for Rust
//
// This library re-exports the request dispatch core and, with the `services`
// feature, the typed service builders.

// Re-export the dispatch core
pub use searchwire_client::*;

// Re-export service builders
#[cfg(feature = "services")]
pub use searchwire_services;

#[cfg(feature = "services")]
pub use searchwire_services::{ClientExt, Refresh};

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Body,
        Client,
        ClientConfig,
        Decoder,
        Error,
        Method,
        PerformRequestOptions,
        Response,
        Result,
        is_conflict,
        is_not_found,
        is_timeout,
    };

    #[cfg(feature = "services")]
    pub use crate::{ClientExt, Refresh};
}
