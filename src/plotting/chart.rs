use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dataloader::{DataPoint, SeriesMetadata};
use crate::error::{AppError, AppResult};
use crate::plotting::axes::AXIS_SLOTS;

/// Colours handed to series in order of addition.
pub const SERIES_COLORS: [&str; 10] = [
    "#2caffe", "#544fc5", "#00e272", "#fe6a35", "#6b8abc", "#d568fb", "#2ee0ca", "#fa4b42",
    "#feb56a", "#91e8e1",
];

/// Points further apart than this many median intervals are not joined.
pub const GAP_SIZE: u32 = 10;

/// Names shown for a plotted series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesLabel {
    /// Legend entry, e.g. `Temp (degC)`
    pub series_name: String,
    /// Y-axis title, e.g. `Temp - water: 1.5 m (degC)`
    pub axis_title: String,
}

impl SeriesLabel {
    #[must_use]
    pub fn from_metadata(metadata: &SeriesMetadata) -> Self {
        Self {
            series_name: format!("{} ({})", metadata.variable_code, metadata.units),
            axis_title: format!(
                "{} - {}{} ({})",
                metadata.variable_code,
                metadata.sampled_medium.as_deref().unwrap_or_default(),
                metadata.z_location_text(),
                metadata.units
            ),
        }
    }
}

/// Rendering surface for the plotted series.
///
/// Implementations only draw; deciding what to draw stays with the session.
pub trait ChartAdapter {
    /// Create or replace the line on `slot` and colour its axis title to match.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Chart` if the chart cannot draw on that slot.
    fn plot(&mut self, slot: usize, label: &SeriesLabel, points: &[DataPoint]) -> AppResult<()>;

    /// Remove the line on `slot` and clear its axis title.
    fn unplot(&mut self, slot: usize);

    /// Set the visible time window; `None` leaves that end to the chart.
    fn set_x_domain(&mut self, min: Option<DateTime<Utc>>, max: Option<DateTime<Utc>>);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSeries {
    pub name: String,
    pub color: String,
    pub gap_size: u32,
    pub connect_nulls: bool,
    /// `[epoch_millis, value]` pairs
    pub data: Vec<(i64, Option<f64>)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YAxis {
    pub title: String,
    pub title_color: Option<String>,
    pub opposite: bool,
    pub line: Option<LineSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XAxis {
    pub title: String,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

/// Headless chart state, serializable for a rendering front end.
#[derive(Debug, Clone, Serialize)]
pub struct ChartModel {
    x_axis: XAxis,
    y_axes: Vec<YAxis>,
    #[serde(skip)]
    color_counter: usize,
}

impl Default for ChartModel {
    fn default() -> Self {
        Self {
            x_axis: XAxis {
                title: "Monitoring Date".to_string(),
                min: None,
                max: None,
            },
            // Axes alternate sides: even slots left, odd slots right.
            y_axes: (0..AXIS_SLOTS)
                .map(|slot| YAxis {
                    title: String::new(),
                    title_color: None,
                    opposite: slot % 2 == 1,
                    line: None,
                })
                .collect(),
            color_counter: 0,
        }
    }
}

impl ChartModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn x_axis(&self) -> &XAxis {
        &self.x_axis
    }

    #[must_use]
    pub fn y_axis(&self, slot: usize) -> Option<&YAxis> {
        self.y_axes.get(slot)
    }

    #[must_use]
    pub fn line(&self, slot: usize) -> Option<&LineSeries> {
        self.y_axes.get(slot).and_then(|axis| axis.line.as_ref())
    }

    /// Number of axes currently carrying a line
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.y_axes.iter().filter(|a| a.line.is_some()).count()
    }

    fn next_color(&mut self) -> String {
        let color = SERIES_COLORS[self.color_counter % SERIES_COLORS.len()];
        self.color_counter += 1;
        color.to_string()
    }

    /// # Errors
    ///
    /// Returns `AppError::Chart` if the model cannot be serialized.
    pub fn to_json(&self) -> AppResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| AppError::Chart(e.to_string()))
    }
}

impl ChartAdapter for ChartModel {
    fn plot(&mut self, slot: usize, label: &SeriesLabel, points: &[DataPoint]) -> AppResult<()> {
        if slot >= self.y_axes.len() {
            return Err(AppError::Chart(format!("No y-axis for slot {slot}")));
        }

        // A replaced line keeps its colour.
        let existing = self.y_axes[slot].line.as_ref().map(|line| line.color.clone());
        let color = existing.unwrap_or_else(|| self.next_color());

        let axis = &mut self.y_axes[slot];
        axis.title = label.axis_title.clone();
        axis.title_color = Some(color.clone());
        axis.line = Some(LineSeries {
            name: label.series_name.clone(),
            color,
            gap_size: GAP_SIZE,
            connect_nulls: false,
            data: points
                .iter()
                .map(|p| (p.timestamp.timestamp_millis(), p.value))
                .collect(),
        });
        Ok(())
    }

    fn unplot(&mut self, slot: usize) {
        if let Some(axis) = self.y_axes.get_mut(slot) {
            axis.line = None;
            axis.title.clear();
            axis.title_color = None;
        }
    }

    fn set_x_domain(&mut self, min: Option<DateTime<Utc>>, max: Option<DateTime<Utc>>) {
        self.x_axis.min = min.map(|t| t.timestamp_millis());
        self.x_axis.max = max.map(|t| t.timestamp_millis());
    }
}
