pub mod error;
pub mod migration;
pub mod models;
pub mod schema;
pub mod store;
pub mod validation;

pub use error::{Result, TrackerError};
pub use models::{Application, ApplicationFull, Stats};
pub use schema::StatusVocabulary;
pub use store::{open_store, Backend, OpenOptions, Store};
