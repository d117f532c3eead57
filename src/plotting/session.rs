//! One user's visualization screen: the site's series, what is plotted where,
//! the visible window, and the chart being drawn.
//!
//! Every series moves through `Unplotted -> Loading -> Plotted -> Unplotted`.
//! A failed or abandoned action always lands back in the state before it
//! started: no slot stays reserved, no partial data is merged, and the
//! checkbox is cleared. The states are published on a `watch` channel, so a
//! front end sees `Loading` (and a disabled checkbox) while a load is pending.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;

use crate::dataloader::{DataPoint, DataSource, ResultId, SamplingFeature, SeriesMetadata};
use crate::error::{AppError, AppResult};
use crate::plotting::axes::AxisAllocator;
use crate::plotting::chart::{ChartAdapter, SeriesLabel};
use crate::plotting::range::{parse_date_input, PlotTarget, QuickRange, RangeController, VisibleRange};
use crate::plotting::store::SeriesStore;
use crate::services::csv_export::CsvExportRequest;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SeriesState {
    #[default]
    Unplotted,
    Loading,
    Plotted,
}

/// What a series checkbox should look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckboxState {
    pub checked: bool,
    /// Disabled while the series is loading
    pub enabled: bool,
}

impl From<SeriesState> for CheckboxState {
    fn from(state: SeriesState) -> Self {
        match state {
            SeriesState::Unplotted => Self { checked: false, enabled: true },
            SeriesState::Loading => Self { checked: true, enabled: false },
            SeriesState::Plotted => Self { checked: true, enabled: true },
        }
    }
}

/// State of every series that is not `Unplotted`.
pub type SeriesStates = HashMap<ResultId, SeriesState>;

fn set_state(states: &watch::Sender<SeriesStates>, result_id: ResultId, state: SeriesState) {
    states.send_modify(|states| {
        if state == SeriesState::Unplotted {
            states.remove(&result_id);
        } else {
            states.insert(result_id, state);
        }
    });
}

/// Read side of a session's series states, usable while the session is busy.
#[derive(Debug, Clone)]
pub struct StateWatch {
    receiver: watch::Receiver<SeriesStates>,
}

impl StateWatch {
    #[must_use]
    pub fn state(&self, result_id: ResultId) -> SeriesState {
        self.receiver.borrow().get(&result_id).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn checkbox(&self, result_id: ResultId) -> CheckboxState {
        self.state(result_id).into()
    }

    /// Wait until `result_id` is in `state`. Returns `false` once the session is gone.
    pub async fn wait_for(&mut self, result_id: ResultId, state: SeriesState) -> bool {
        self.receiver
            .wait_for(|states| states.get(&result_id).copied().unwrap_or_default() == state)
            .await
            .is_ok()
    }
}

/// Axis slot and `Loading` state held for a series until its first draw.
///
/// Dropped without [`Self::commit`] (a failed load, or a plotting future
/// that was itself dropped) it releases the slot and returns the series to
/// `Unplotted`.
struct PlotReservation<'a> {
    axes: &'a mut AxisAllocator,
    states: &'a watch::Sender<SeriesStates>,
    result_id: ResultId,
    slot: usize,
    committed: bool,
}

impl<'a> PlotReservation<'a> {
    fn reserve(
        axes: &'a mut AxisAllocator,
        states: &'a watch::Sender<SeriesStates>,
        result_id: ResultId,
    ) -> AppResult<Self> {
        let slot = axes.allocate(result_id)?;
        set_state(states, result_id, SeriesState::Loading);
        Ok(Self {
            axes,
            states,
            result_id,
            slot,
            committed: false,
        })
    }

    fn commit(mut self) {
        self.committed = true;
        set_state(self.states, self.result_id, SeriesState::Plotted);
    }
}

impl Drop for PlotReservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        self.axes.release(self.result_id);
        set_state(self.states, self.result_id, SeriesState::Unplotted);
        tracing::debug!(result_id = self.result_id, slot = self.slot, "Plot abandoned, slot released");
    }
}

/// Marks plotted series `Loading` during a range change and restores them
/// to `Plotted` when dropped, finished or not.
struct RefreshMarks<'a> {
    states: &'a watch::Sender<SeriesStates>,
    result_ids: Vec<ResultId>,
}

impl<'a> RefreshMarks<'a> {
    fn mark(states: &'a watch::Sender<SeriesStates>, result_ids: Vec<ResultId>) -> Self {
        states.send_modify(|states| {
            for id in &result_ids {
                states.insert(*id, SeriesState::Loading);
            }
        });
        Self { states, result_ids }
    }
}

impl Drop for RefreshMarks<'_> {
    fn drop(&mut self) {
        self.states.send_modify(|states| {
            for id in &self.result_ids {
                states.insert(*id, SeriesState::Plotted);
            }
        });
    }
}

/// One entry in the series list.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesPanel {
    pub result_id: ResultId,
    pub label: String,
    pub checkbox: CheckboxState,
    pub plotted: bool,
}

pub struct VisualizationSession<C: ChartAdapter> {
    source: Arc<dyn DataSource>,
    store: SeriesStore,
    axes: AxisAllocator,
    range: RangeController,
    chart: C,
    site_code: Option<String>,
    metadata: BTreeMap<ResultId, SeriesMetadata>,
    states: watch::Sender<SeriesStates>,
    notices: Vec<String>,
}

impl<C: ChartAdapter> VisualizationSession<C> {
    pub fn new(source: Arc<dyn DataSource>, chart: C) -> Self {
        Self {
            store: SeriesStore::new(source.clone()),
            source,
            axes: AxisAllocator::new(),
            range: RangeController::new(),
            chart,
            site_code: None,
            metadata: BTreeMap::new(),
            states: watch::channel(SeriesStates::new()).0,
            notices: Vec::new(),
        }
    }

    pub fn chart(&self) -> &C {
        &self.chart
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    pub fn site_code(&self) -> Option<&str> {
        self.site_code.as_deref()
    }

    pub fn visible_range(&self) -> VisibleRange {
        self.range.visible()
    }

    pub fn metadata(&self, result_id: ResultId) -> Option<&SeriesMetadata> {
        self.metadata.get(&result_id)
    }

    pub fn state(&self, result_id: ResultId) -> SeriesState {
        self.states.borrow().get(&result_id).copied().unwrap_or_default()
    }

    /// Follow series states from outside, e.g. while a plot is loading.
    pub fn state_watch(&self) -> StateWatch {
        StateWatch {
            receiver: self.states.subscribe(),
        }
    }

    pub fn checkbox(&self, result_id: ResultId) -> CheckboxState {
        self.state(result_id).into()
    }

    pub fn slot_of(&self, result_id: ResultId) -> Option<usize> {
        self.axes.slot_of(result_id)
    }

    /// Plotted series in axis order.
    pub fn plotted(&self) -> Vec<ResultId> {
        self.axes.occupied().map(|(_, id)| id).collect()
    }

    /// Drain the messages queued for the user.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    fn notify(&mut self, error: &AppError) {
        self.notices.push(error.user_message());
    }

    /// Sites for the site selector.
    ///
    /// # Errors
    ///
    /// Returns the data source error if the site list cannot be fetched.
    pub async fn list_sites(&self) -> AppResult<Vec<SamplingFeature>> {
        self.source.sampling_features().await
    }

    /// Replace the series list with those of `site_code`.
    ///
    /// Everything plotted is removed and cached values of series that are
    /// not part of the new site are dropped. On failure the current site
    /// stays loaded.
    ///
    /// # Errors
    ///
    /// Returns the data source error if the metadata cannot be fetched.
    pub async fn load_site(&mut self, site_code: &str) -> AppResult<()> {
        let series = match self.source.sampling_feature_metadata(site_code).await {
            Ok(series) => series,
            Err(e) => {
                tracing::error!(error = %e, site_code, "Failed to load site metadata");
                self.notify(&e);
                return Err(e);
            }
        };

        for result_id in self.plotted() {
            self.unplot_series(result_id);
        }

        self.metadata = series.into_iter().map(|m| (m.result_id, m)).collect();
        self.states.send_modify(|states| states.clear());
        let keep: HashSet<ResultId> = self.metadata.keys().copied().collect();
        self.store.retain(&keep).await;
        self.site_code = Some(site_code.to_string());

        tracing::info!(site_code, series = self.metadata.len(), "Site loaded");
        Ok(())
    }

    /// Series list entries: plotted first (in axis order), then the rest.
    pub fn series_panels(&self) -> Vec<SeriesPanel> {
        let panel = |metadata: &SeriesMetadata| {
            let state = self.state(metadata.result_id);
            SeriesPanel {
                result_id: metadata.result_id,
                label: metadata.panel_label(),
                checkbox: state.into(),
                plotted: state != SeriesState::Unplotted,
            }
        };

        let plotted = self.plotted();
        let mut panels: Vec<SeriesPanel> = plotted
            .iter()
            .filter_map(|id| self.metadata.get(id))
            .map(panel)
            .collect();
        panels.extend(
            self.metadata
                .values()
                .filter(|m| !plotted.contains(&m.result_id))
                .map(panel),
        );
        panels
    }

    /// Checkbox handler.
    ///
    /// # Errors
    ///
    /// See [`Self::plot_series`].
    pub async fn toggle_series(&mut self, result_id: ResultId, checked: bool) -> AppResult<()> {
        if checked {
            self.plot_series(result_id).await
        } else {
            self.unplot_series(result_id);
            Ok(())
        }
    }

    /// Load the visible window for a series and draw it on a free axis.
    ///
    /// Calls for a series that is already loading or plotted are ignored.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` if the series is not part of the loaded site
    /// - `AppError::CapacityExceeded` if every axis is in use
    /// - the data source or chart error if loading or drawing fails
    pub async fn plot_series(&mut self, result_id: ResultId) -> AppResult<()> {
        if self.state(result_id) != SeriesState::Unplotted {
            tracing::debug!(result_id, "Series already plotted or loading");
            return Ok(());
        }
        let Some(metadata) = self.metadata.get(&result_id) else {
            return Err(AppError::NotFound(format!("Series {result_id} is not part of this site")));
        };
        let label = SeriesLabel::from_metadata(metadata);

        let reservation = match PlotReservation::reserve(&mut self.axes, &self.states, result_id) {
            Ok(reservation) => reservation,
            Err(e) => {
                tracing::warn!(result_id, "All axes in use");
                // Field-level push: the reservation still borrows `self.axes`.
                self.notices.push(e.user_message());
                return Err(e);
            }
        };
        let slot = reservation.slot;
        let (start, end) = self.range.visible().fetch_window(Utc::now());

        let drawn = match self.store.ensure_loaded(result_id, start, end).await {
            Ok(()) => {
                let points = self.store.points(result_id).await;
                self.chart.plot(slot, &label, &points)
            }
            Err(e) => Err(e),
        };

        match drawn {
            Ok(()) => {
                reservation.commit();
                tracing::info!(result_id, slot, "Series plotted");
                Ok(())
            }
            Err(e) => {
                drop(reservation);
                // Fetch failures are already logged by the store.
                if !e.is_network_failure() {
                    tracing::error!(error = %e, result_id, slot, "Failed to draw series");
                }
                // Field-level push: the reservation still borrows `self.axes`.
                self.notices.push(e.user_message());
                Err(e)
            }
        }
    }

    /// Remove a series from the chart. Its cached values are kept for a replot.
    pub fn unplot_series(&mut self, result_id: ResultId) {
        if let Some(slot) = self.axes.release(result_id) {
            self.chart.unplot(slot);
            tracing::info!(result_id, slot, "Series unplotted");
        }
        set_state(&self.states, result_id, SeriesState::Unplotted);
    }

    /// Change the visible window, back-filling plotted series as needed.
    ///
    /// Series whose back-fill fails are unplotted and reported.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` if `min` is after `max`.
    pub async fn set_range(
        &mut self,
        min: Option<DateTime<Utc>>,
        max: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<ResultId>> {
        let targets: Vec<PlotTarget> = self
            .axes
            .occupied()
            .filter_map(|(slot, result_id)| {
                self.metadata.get(&result_id).map(|m| PlotTarget {
                    result_id,
                    slot,
                    label: SeriesLabel::from_metadata(m),
                })
            })
            .collect();

        let marks = RefreshMarks::mark(&self.states, targets.iter().map(|t| t.result_id).collect());
        let outcome = self
            .range
            .set_range(min, max, &self.store, &targets, &mut self.chart)
            .await;
        drop(marks);

        let failures = match outcome {
            Ok(failures) => failures,
            Err(e) => {
                self.notify(&e);
                return Err(e);
            }
        };

        let mut dropped = Vec::with_capacity(failures.len());
        for (result_id, e) in failures {
            tracing::warn!(error = %e, result_id, "Back-fill failed, removing series");
            self.unplot_series(result_id);
            self.notify(&e);
            dropped.push(result_id);
        }
        Ok(dropped)
    }

    /// Apply a shortcut button.
    ///
    /// # Errors
    ///
    /// See [`Self::set_range`].
    pub async fn apply_quick_range(
        &mut self,
        quick_range: QuickRange,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<ResultId>> {
        let bounds = quick_range.bounds(now);
        self.set_range(bounds.min, bounds.max).await
    }

    /// Apply the start/end date inputs.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for unparseable or reversed dates.
    pub async fn set_range_from_inputs(
        &mut self,
        start_text: &str,
        end_text: &str,
    ) -> AppResult<Vec<ResultId>> {
        let parsed = parse_date_input(start_text).and_then(|min| Ok((min, parse_date_input(end_text)?)));
        match parsed {
            Ok((min, max)) => self.set_range(min, max).await,
            Err(e) => {
                self.notify(&e);
                Err(e)
            }
        }
    }

    /// Server-side CSV export of the plotted series over the visible window.
    pub fn csv_export_request(&self) -> CsvExportRequest {
        let visible = self.range.visible();
        CsvExportRequest {
            result_ids: self.plotted(),
            min_datetime: visible.min.map(|t| t.date_naive()),
            max_datetime: visible.max.map(|t| t.date_naive()),
        }
    }

    /// Plotted series with their legend names, for a local CSV export.
    pub async fn plotted_columns(&self) -> Vec<(String, Vec<DataPoint>)> {
        let mut columns = Vec::new();
        for result_id in self.plotted() {
            let name = self
                .metadata
                .get(&result_id)
                .map_or_else(|| result_id.to_string(), |m| SeriesLabel::from_metadata(m).series_name);
            columns.push((name, self.store.points(result_id).await));
        }
        columns
    }
}
