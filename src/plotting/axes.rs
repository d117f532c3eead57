use crate::dataloader::ResultId;
use crate::error::{AppError, AppResult};

/// Number of y-axes on the chart; one series per axis.
pub const AXIS_SLOTS: usize = 6;

/// Fixed pool of chart axes, each holding at most one series.
///
/// A series keeps its slot until it is released, so new data can be drawn
/// onto the same axis without re-adding the series.
#[derive(Debug, Clone, Default)]
pub struct AxisAllocator {
    slots: [Option<ResultId>; AXIS_SLOTS],
}

impl AxisAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `result_id` a slot, or return the one it already holds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CapacityExceeded` when every slot is taken; the
    /// allocation state is left unchanged.
    pub fn allocate(&mut self, result_id: ResultId) -> AppResult<usize> {
        if let Some(slot) = self.slot_of(result_id) {
            return Ok(slot);
        }
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(AppError::CapacityExceeded { max: AXIS_SLOTS })?;
        self.slots[slot] = Some(result_id);
        tracing::debug!(result_id, slot, "Axis allocated");
        Ok(slot)
    }

    /// Free the slot held by `result_id`, returning it. No-op when not plotted.
    pub fn release(&mut self, result_id: ResultId) -> Option<usize> {
        let slot = self.slot_of(result_id)?;
        self.slots[slot] = None;
        tracing::debug!(result_id, slot, "Axis released");
        Some(slot)
    }

    #[must_use]
    pub fn slot_of(&self, result_id: ResultId) -> Option<usize> {
        self.slots.iter().position(|s| *s == Some(result_id))
    }

    /// `(slot, result_id)` for every occupied slot, in slot order.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, ResultId)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, id)| id.map(|id| (slot, id)))
    }
}
