// Apartment Locator - Core Library
// Exposes all modules for use in the terminal locator, the extraction server, and tests

pub mod config;
pub mod error;
pub mod records;        // Sheet CSV → apartment records
pub mod search;         // Comma-separated codes → matched records
pub mod share;          // Share links (?apparts=)
pub mod source;         // Where the sheet comes from
pub mod geocode;        // Address → coordinate collaborator
pub mod map;            // Marker collaborator
pub mod session;        // Page controller with search epochs
pub mod extraction;     // Document → LLM → reference codes

#[cfg(feature = "server")]
pub mod server;

// Re-export commonly used types
pub use config::Config;
pub use error::{ExtractError, LocatorError, UpstreamError};
pub use records::{parse_csv, ApartmentRecord, RecordSet};
pub use search::{resolve, split_codes, SearchOutcome};
pub use share::{share_link, shared_codes};
pub use source::{FileSheet, HttpSheet, RecordSource, StaticSheet};
pub use geocode::{Coordinate, GeocodeError, Geocoder, GoogleGeocoder};
pub use map::{MapSurface, Marker, MarkerBoard, MarkerId, MarkerKind};
pub use session::{LocatorSession, SearchReport, SessionSettings, SessionSnapshot, SharedRestore};
pub use extraction::{
    salvage, CredentialSource, ExtractRequest, ExtractResponse, ExtractionResult, ExtractionService,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
