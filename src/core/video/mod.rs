pub mod detector;
pub mod frame;
pub mod render;
pub mod source;

pub use detector::{FullFrameDetector, MockPlateDetector, PlateDetector};
pub use frame::{Frame, Region};
pub use render::{BoxRenderer, NullRenderer, Renderer};
pub use source::{FrameSource, ImageDirSource, VecFrameSource};
