pub mod axes;
pub mod chart;
pub mod range;
pub mod session;
pub mod store;

pub use axes::{AxisAllocator, AXIS_SLOTS};
pub use chart::{ChartAdapter, ChartModel, SeriesLabel};
pub use range::{QuickRange, RangeController, VisibleRange};
pub use session::{CheckboxState, SeriesPanel, SeriesState, SeriesStates, StateWatch, VisualizationSession};
pub use store::{LoadedBounds, SeriesData, SeriesStore};
