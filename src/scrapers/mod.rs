pub mod fetcher;
pub mod inha;
pub mod traits;
pub mod types;

pub use fetcher::{FetchSettings, HttpFetcher};
pub use inha::InhaExtractor;
pub use traits::DocumentFetcher;
pub use types::{Backoff, ListingFields, RawListingRow, RetryPolicy};
