pub mod csv_import;
pub mod model;
pub mod time_signature;

pub use csv_import::*;
pub use model::*;
pub use time_signature::*;
