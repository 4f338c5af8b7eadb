pub mod anpr;
pub mod error;
pub mod inference;
pub mod persist;
pub mod video;

pub use error::AnprError;
