//! Message routing and field extraction over registered filter definitions.
//!
//! Clients register filters naming a message source, a mapping table of
//! dotted paths to pull out, and optionally identifiers that recognize
//! matching messages by content. The [`FilterHandler`] deduplicates the
//! shared pieces, routes each incoming message to every filter concerned
//! with it, and yields one extraction result per distinct mapping
//! configuration.
//!
//! ```
//! use msgfilter::{FilterDefinition, FilterHandler, ResultOptions};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let handler = FilterHandler::new();
//! handler.add_filter(FilterDefinition::new(
//!     "f1",
//!     "dev1",
//!     [("temperature:data", "payload.t")],
//! ))?;
//!
//! let message = json!({"payload": {"t": 21}});
//! let results = handler.get_results(&message, ResultOptions::new().with_source("dev1"))?;
//! for result in results {
//!     let extracted = result.outcome?;
//!     assert_eq!(extracted.data["temperature"], json!(21));
//! }
//! # Ok(())
//! # }
//! ```

mod hash;

pub mod builders;
pub mod filter;
pub mod handler;
pub mod identity;
pub mod mapping;
pub mod path;
pub mod result;

pub use builders::{MapBuilder, PairListBuilder, ResultBuilder, StringListBuilder};
pub use filter::{FilterDefinition, ValidationError};
pub use handler::{AddFilterError, FilterHandler, GetResultsError, UnknownFilterIdError};
pub use identity::Identifier;
pub use mapping::{Mapping, MappingGroup, MappingRecord, ParseMappingsError, ValueType};
pub use path::MappingError;
pub use result::{Extracted, FilterResult, FilterResults, ResultOptions};
