//! Canonical documents and their assembly from extraction results.

mod builder;
mod models;

pub use builder::{path_id, DocumentBuilder, TRUNCATED_TAG};
pub use models::{Document, FieldValue, IdKind, Status};

pub(crate) use models::now_unix;
