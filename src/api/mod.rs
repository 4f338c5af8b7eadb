pub mod session;

pub use session::{AnprSession, DetectorKind, SessionOptions};
