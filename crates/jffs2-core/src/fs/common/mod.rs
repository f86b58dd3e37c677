/// Shared input and field-decoding helpers
pub mod types;

pub use types::{DumpImage, Endianness, FieldReader};
