//! Fakes shared by the integration tests: an in-memory data source and a local HTTP stub.
#![allow(dead_code)]

pub mod http_stub;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use websdl_viz::dataloader::{DataPoint, DataSource, ResultId, SamplingFeature, SeriesMetadata};
use websdl_viz::error::{AppError, AppResult};

pub fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

pub fn metadata(result_id: ResultId, site_code: &str) -> SeriesMetadata {
    SeriesMetadata {
        result_id,
        result_uuid: None,
        site_code: site_code.to_string(),
        variable_code: format!("Var{result_id}"),
        units: "degC".to_string(),
        sampled_medium: Some("water".to_string()),
        z_location: None,
        z_location_units: None,
    }
}

/// Serves one reading per day from 2021-01-01 through 2023-12-31 for every series.
#[derive(Default)]
pub struct FakeSource {
    sites: HashMap<String, Vec<SeriesMetadata>>,
    calls: Mutex<Vec<(ResultId, DateTime<Utc>, DateTime<Utc>)>>,
    failing: Mutex<HashSet<ResultId>>,
    fail_before: Mutex<HashMap<ResultId, DateTime<Utc>>>,
    holds: Mutex<HashMap<ResultId, Arc<Notify>>>,
}

impl FakeSource {
    pub fn with_site(mut self, site_code: &str, ids: impl IntoIterator<Item = ResultId>) -> Self {
        let series = ids.into_iter().map(|id| metadata(id, site_code)).collect();
        self.sites.insert(site_code.to_string(), series);
        self
    }

    /// Every time-series request for `result_id` fails.
    pub fn fail(&self, result_id: ResultId) {
        self.failing.lock().unwrap().insert(result_id);
    }

    /// Requests for `result_id` starting before `cutoff` fail.
    pub fn fail_before(&self, result_id: ResultId, cutoff: DateTime<Utc>) {
        self.fail_before.lock().unwrap().insert(result_id, cutoff);
    }

    /// Time-series requests for `result_id` wait until the returned gate is
    /// notified once per request. A gate nobody notifies never answers.
    pub fn hold(&self, result_id: ResultId) -> Arc<Notify> {
        self.holds
            .lock()
            .unwrap()
            .entry(result_id)
            .or_default()
            .clone()
    }

    /// Answer requests for `result_id` immediately again.
    pub fn release_hold(&self, result_id: ResultId) {
        self.holds.lock().unwrap().remove(&result_id);
    }

    pub fn calls(&self) -> Vec<(ResultId, DateTime<Utc>, DateTime<Utc>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, result_id: ResultId) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.calls()
            .into_iter()
            .filter(|(id, _, _)| *id == result_id)
            .map(|(_, s, e)| (s, e))
            .collect()
    }
}

#[async_trait]
impl DataSource for FakeSource {
    async fn sampling_features(&self) -> AppResult<Vec<SamplingFeature>> {
        let mut codes: Vec<&String> = self.sites.keys().collect();
        codes.sort();
        Ok(codes
            .into_iter()
            .map(|code| SamplingFeature {
                id: None,
                code: code.clone(),
                name: None,
                latitude: None,
                longitude: None,
            })
            .collect())
    }

    async fn sampling_feature_metadata(&self, site_code: &str) -> AppResult<Vec<SeriesMetadata>> {
        self.sites
            .get(site_code)
            .cloned()
            .ok_or_else(|| AppError::Network(format!("HTTP 404: unknown site {site_code}")))
    }

    async fn result_timeseries(
        &self,
        result_id: ResultId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<DataPoint>> {
        self.calls.lock().unwrap().push((result_id, start, end));
        // Let other loads interleave as they would at the network boundary.
        tokio::task::yield_now().await;

        let gate = self.holds.lock().unwrap().get(&result_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.failing.lock().unwrap().contains(&result_id) {
            return Err(AppError::Network("HTTP 500".to_string()));
        }
        let cutoff = self.fail_before.lock().unwrap().get(&result_id).copied();
        if cutoff.is_some_and(|c| start < c) {
            return Err(AppError::Network("connection reset".to_string()));
        }

        let mut points = Vec::new();
        let mut day = date(2021, 1, 1);
        while day <= date(2023, 12, 31) {
            if day >= start && day <= end {
                points.push(DataPoint::new(day, Some(result_id as f64)));
            }
            day += Duration::days(1);
        }
        Ok(points)
    }
}
