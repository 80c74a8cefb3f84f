pub mod ads;
pub mod error;
pub mod protocol;
pub mod rating;

pub use ads::{AdElement, AdKind, AdMetadata, AdPosition, AdReport};
pub use error::BackendError;
pub use protocol::{Event, EventKind, Params, Scalar};
pub use rating::{Rating, RatingError};
