//! End-to-end scenarios for the visualization session.
//!
//! Run with: cargo test --test session_test

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

use common::{date, FakeSource};
use websdl_viz::error::AppError;
use websdl_viz::plotting::{
    CheckboxState, ChartModel, QuickRange, SeriesState, VisualizationSession, AXIS_SLOTS,
};

async fn session_with(
    source: Arc<FakeSource>,
    site: &str,
) -> VisualizationSession<ChartModel> {
    let mut session = VisualizationSession::new(source, ChartModel::new());
    assert_ok!(session.load_site(site).await);
    session
}

#[tokio::test]
async fn widening_range_backfills_exactly_the_missing_window() {
    let source = Arc::new(FakeSource::default().with_site("WCC019", [100]));
    let mut session = session_with(source.clone(), "WCC019").await;

    assert_ok!(session.set_range(Some(date(2023, 1, 1)), Some(date(2023, 6, 1))).await);
    assert_ok!(session.toggle_series(100, true).await);
    assert_eq!(session.state(100), SeriesState::Plotted);

    let dropped = assert_ok!(session.set_range(Some(date(2022, 1, 1)), Some(date(2023, 6, 1))).await);
    assert!(dropped.is_empty());

    assert_eq!(
        source.calls_for(100),
        vec![
            (date(2023, 1, 1), date(2023, 6, 1)),
            (date(2022, 1, 1), date(2023, 1, 1)),
        ]
    );

    let slot = session.slot_of(100).unwrap();
    let line = session.chart().line(slot).unwrap();
    assert_eq!(line.data.first().unwrap().0, date(2022, 1, 1).timestamp_millis());
    assert_eq!(line.data.last().unwrap().0, date(2023, 6, 1).timestamp_millis());
    assert_eq!(line.data.len(), session.store().points(100).await.len());
    assert_eq!(
        session.chart().x_axis().min,
        Some(date(2022, 1, 1).timestamp_millis())
    );
}

#[tokio::test]
async fn seventh_series_is_rejected_without_side_effects() {
    let source = Arc::new(FakeSource::default().with_site("WCC019", 100..107));
    let mut session = session_with(source.clone(), "WCC019").await;
    assert_ok!(session.set_range(Some(date(2023, 1, 1)), Some(date(2023, 2, 1))).await);

    for id in 100..106 {
        assert_ok!(session.toggle_series(id, true).await);
    }
    let plotted_before = session.plotted();
    let calls_before = source.calls().len();

    let err = assert_err!(session.toggle_series(106, true).await);
    assert!(matches!(err, AppError::CapacityExceeded { max: AXIS_SLOTS }));

    let checkbox = session.checkbox(106);
    assert!(!checkbox.checked);
    assert!(checkbox.enabled);
    assert_eq!(session.take_notices().len(), 1);
    assert_eq!(session.plotted(), plotted_before);
    assert_eq!(session.chart().line_count(), AXIS_SLOTS);
    assert_eq!(source.calls().len(), calls_before);
}

#[tokio::test]
async fn replot_reuses_cached_data() {
    let source = Arc::new(FakeSource::default().with_site("WCC019", [100, 101]));
    let mut session = session_with(source.clone(), "WCC019").await;
    assert_ok!(session.set_range(Some(date(2023, 1, 1)), Some(date(2023, 6, 1))).await);

    assert_ok!(session.toggle_series(100, true).await);
    assert_ok!(session.toggle_series(100, false).await);
    assert_eq!(session.state(100), SeriesState::Unplotted);
    assert_eq!(session.chart().line_count(), 0);
    assert_eq!(session.chart().y_axis(0).unwrap().title, "");

    assert_ok!(session.toggle_series(100, true).await);
    assert_eq!(source.calls_for(100).len(), 1);
    assert_eq!(session.chart().line_count(), 1);
}

#[tokio::test]
async fn all_time_view_renders_full_cache() {
    let source = Arc::new(FakeSource::default().with_site("WCC019", [100]));
    let mut session = session_with(source.clone(), "WCC019").await;
    assert_ok!(session.set_range(Some(date(2023, 1, 1)), Some(date(2023, 6, 1))).await);
    assert_ok!(session.plot_series(100).await);

    assert_ok!(session.apply_quick_range(QuickRange::AllTime, date(2024, 1, 1)).await);

    let slot = session.slot_of(100).unwrap();
    let line = session.chart().line(slot).unwrap();
    assert_eq!(line.data.first().unwrap().0, date(2021, 1, 1).timestamp_millis());
    assert_eq!(line.data.len(), session.store().points(100).await.len());
    assert_eq!(session.chart().x_axis().min, None);
    assert_eq!(session.chart().x_axis().max, None);
}

#[tokio::test]
async fn network_failure_reverts_checkbox() {
    let source = Arc::new(FakeSource::default().with_site("WCC019", [100]));
    source.fail(100);
    let mut session = session_with(source.clone(), "WCC019").await;
    assert_ok!(session.set_range(Some(date(2023, 1, 1)), Some(date(2023, 6, 1))).await);

    let err = assert_err!(session.toggle_series(100, true).await);
    assert!(err.is_network_failure());
    assert_eq!(session.state(100), SeriesState::Unplotted);
    assert!(!session.checkbox(100).checked);
    assert_eq!(session.slot_of(100), None);
    assert_eq!(session.chart().line_count(), 0);
    assert_eq!(session.take_notices().len(), 1);
}

#[tokio::test]
async fn failed_backfill_unplots_only_that_series() {
    let source = Arc::new(FakeSource::default().with_site("WCC019", [100, 101]));
    let mut session = session_with(source.clone(), "WCC019").await;
    assert_ok!(session.set_range(Some(date(2023, 1, 1)), Some(date(2023, 6, 1))).await);
    assert_ok!(session.plot_series(100).await);
    assert_ok!(session.plot_series(101).await);

    source.fail_before(101, date(2023, 1, 1));
    let dropped = assert_ok!(session.set_range(Some(date(2022, 1, 1)), Some(date(2023, 6, 1))).await);

    assert_eq!(dropped, vec![101]);
    assert_eq!(session.plotted(), vec![100]);
    assert_eq!(session.state(101), SeriesState::Unplotted);
    assert_eq!(session.chart().line_count(), 1);
    assert_eq!(session.take_notices().len(), 1);
}

#[tokio::test]
async fn reversed_date_inputs_are_rejected() {
    let source = Arc::new(FakeSource::default().with_site("WCC019", [100]));
    let mut session = session_with(source, "WCC019").await;

    let err = assert_err!(session.set_range_from_inputs("2023-06-01", "2023-01-01").await);
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(session.visible_range().min, None);

    assert_ok!(session.set_range_from_inputs("2023-01-01", "").await);
    assert_eq!(session.visible_range().min, Some(date(2023, 1, 1)));
    assert_eq!(session.visible_range().max, None);
}

#[tokio::test]
async fn loading_new_site_replaces_series_and_clears_chart() {
    let source = Arc::new(
        FakeSource::default()
            .with_site("WCC019", [100, 101])
            .with_site("CWS-ThomasDairy2", [200]),
    );
    let mut session = session_with(source.clone(), "WCC019").await;
    assert_ok!(session.set_range(Some(date(2023, 1, 1)), Some(date(2023, 2, 1))).await);
    assert_ok!(session.plot_series(100).await);

    assert_ok!(session.load_site("CWS-ThomasDairy2").await);
    assert!(session.plotted().is_empty());
    assert_eq!(session.chart().line_count(), 0);
    assert!(session.metadata(100).is_none());
    assert!(session.store().loaded_bounds(100).await.is_none());
    assert_eq!(session.series_panels().len(), 1);

    assert_err!(session.load_site("missing").await);
    assert_eq!(session.site_code(), Some("CWS-ThomasDairy2"));
}

#[tokio::test]
async fn panels_list_plotted_series_first() {
    let source = Arc::new(FakeSource::default().with_site("WCC019", [100, 101, 102]));
    let mut session = session_with(source, "WCC019").await;
    assert_ok!(session.set_range(Some(date(2023, 1, 1)), Some(date(2023, 2, 1))).await);
    assert_ok!(session.plot_series(102).await);

    let panels = session.series_panels();
    assert_eq!(
        panels.iter().map(|p| p.result_id).collect::<Vec<_>>(),
        vec![102, 100, 101]
    );
    assert!(panels[0].plotted && panels[0].checkbox.checked);
    assert!(!panels[1].plotted);

    let export = session.csv_export_request();
    assert_eq!(export.result_ids, vec![102]);
    assert_eq!(
        export.min_datetime,
        Some(date(2023, 1, 1).date_naive())
    );
}

#[tokio::test]
async fn unknown_series_is_not_found() {
    let source = Arc::new(FakeSource::default().with_site("WCC019", [100]));
    let mut session = session_with(source.clone(), "WCC019").await;

    let err = assert_err!(session.plot_series(999).await);
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(source.calls().is_empty());
    assert!(assert_ok!(session.list_sites().await).iter().any(|s| s.code == "WCC019"));
}

#[tokio::test]
async fn abandoned_plot_releases_slot_and_allows_replot() {
    let source = Arc::new(FakeSource::default().with_site("WCC019", [100]));
    let mut session = session_with(source.clone(), "WCC019").await;
    assert_ok!(session.set_range(Some(date(2023, 1, 1)), Some(date(2023, 6, 1))).await);

    let _gate = source.hold(100);
    assert_err!(timeout(Duration::from_millis(50), session.plot_series(100)).await);

    assert_eq!(session.state(100), SeriesState::Unplotted);
    assert_eq!(session.slot_of(100), None);
    assert_eq!(session.checkbox(100), CheckboxState { checked: false, enabled: true });
    assert_eq!(session.chart().line_count(), 0);
    assert!(session.plotted().is_empty());
    assert!(session.store().loaded_bounds(100).await.is_none());

    source.release_hold(100);
    assert_ok!(session.plot_series(100).await);
    assert_eq!(session.state(100), SeriesState::Plotted);
    assert_eq!(session.slot_of(100), Some(0));
    assert_eq!(session.chart().line_count(), 1);
}

#[tokio::test]
async fn abandoned_range_change_keeps_series_plotted() {
    let source = Arc::new(FakeSource::default().with_site("WCC019", [100]));
    let mut session = session_with(source.clone(), "WCC019").await;
    assert_ok!(session.set_range(Some(date(2023, 1, 1)), Some(date(2023, 6, 1))).await);
    assert_ok!(session.plot_series(100).await);

    let _gate = source.hold(100);
    assert_err!(
        timeout(
            Duration::from_millis(50),
            session.set_range(Some(date(2022, 1, 1)), Some(date(2023, 6, 1)))
        )
        .await
    );

    assert_eq!(session.state(100), SeriesState::Plotted);
    assert_eq!(session.checkbox(100), CheckboxState { checked: true, enabled: true });
    assert_eq!(session.slot_of(100), Some(0));
    assert_eq!(session.visible_range().min, Some(date(2023, 1, 1)));
    assert_eq!(
        session.store().loaded_bounds(100).await.map(|b| b.start),
        Some(date(2023, 1, 1))
    );

    source.release_hold(100);
    assert_ok!(session.set_range(Some(date(2022, 1, 1)), Some(date(2023, 6, 1))).await);
    assert_eq!(session.visible_range().min, Some(date(2022, 1, 1)));
}

#[tokio::test]
async fn checkbox_is_disabled_while_series_loads() {
    let source = Arc::new(FakeSource::default().with_site("WCC019", [100]));
    let mut session = session_with(source.clone(), "WCC019").await;
    assert_ok!(session.set_range(Some(date(2023, 1, 1)), Some(date(2023, 6, 1))).await);

    let gate = source.hold(100);
    let mut watch = session.state_watch();
    let observer = async move {
        assert!(watch.wait_for(100, SeriesState::Loading).await);
        let during = watch.checkbox(100);
        gate.notify_one();
        assert!(watch.wait_for(100, SeriesState::Plotted).await);
        (during, watch.checkbox(100))
    };

    let (plotted, (during, after)) = tokio::join!(session.plot_series(100), observer);
    assert_ok!(plotted);
    assert_eq!(during, CheckboxState { checked: true, enabled: false });
    assert_eq!(after, CheckboxState { checked: true, enabled: true });
    assert_eq!(session.checkbox(100), after);
}

#[tokio::test]
async fn plotted_series_are_loading_during_backfill() {
    let source = Arc::new(FakeSource::default().with_site("WCC019", [100]));
    let mut session = session_with(source.clone(), "WCC019").await;
    assert_ok!(session.set_range(Some(date(2023, 1, 1)), Some(date(2023, 6, 1))).await);
    assert_ok!(session.plot_series(100).await);

    let gate = source.hold(100);
    let mut watch = session.state_watch();
    let observer = async move {
        assert!(watch.wait_for(100, SeriesState::Loading).await);
        let enabled = watch.checkbox(100).enabled;
        gate.notify_one();
        enabled
    };

    let (changed, enabled_during) = tokio::join!(
        session.set_range(Some(date(2022, 1, 1)), Some(date(2023, 6, 1))),
        observer
    );
    assert!(assert_ok!(changed).is_empty());
    assert!(!enabled_during);
    assert_eq!(session.state(100), SeriesState::Plotted);
}
