//! Bronze and trash writers over [`object_store`] (schema §4.8): an
//! append-only partitioned raw-record lake, and an object-store area for
//! rejected records and debug artifacts.

mod bronze;
mod error;
mod partition;
mod trash;

pub use bronze::BronzeWriter;
pub use error::{Error, Result};
pub use partition::WriteContext;
pub use trash::TrashWriter;
