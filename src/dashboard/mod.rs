//! Dashboard coordinator.
//!
//! Owns the dataset, the filter selection and the highlight broker, and
//! turns interaction events into fresh snapshots of every view. Each
//! snapshot re-runs the whole pipeline from the store.

pub mod events;

pub use events::{DashboardError, DashboardEvent};

use crate::analysis::{
    cross_tab_type_model, enrollment_time_series, model_enrollment_share, size_group_by_model,
    size_groups, virtual_share_per_district_month, VirtualShareMap,
};
use crate::filter::{FilterPipeline, FilterSelection};
use crate::highlight::{Click, ClickTarget, HighlightBroker, HighlightState, ViewHighlight, ViewKind};
use crate::models::{
    CrossTabCell, DistrictShare, Highlighted, LearningModel, ModelShare, SizeGroup,
    SizeGroupCount, TimeSeriesPoint, YearMonth,
};
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Everything the views need to draw one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub selection: FilterSelection,
    /// Slider label of the selected month, e.g. "June 2021".
    pub month_label: Option<String>,
    pub slider_index: Option<usize>,
    pub slider_len: usize,
    pub highlight: HighlightState,
    pub working_set_size: usize,
    pub total_enrollment: u64,
    pub size_groups: Vec<SizeGroup>,
    pub size_group_counts: Vec<Highlighted<SizeGroupCount>>,
    pub model_shares: Vec<Highlighted<ModelShare>>,
    pub district_shares: Vec<DistrictShare>,
    pub cross_tab: Vec<Highlighted<CrossTabCell>>,
    pub time_series: Vec<Highlighted<TimeSeriesPoint>>,
}

/// Top-level coordinator; the only owner of mutable dashboard state.
#[derive(Debug)]
pub struct Dashboard {
    store: RecordStore,
    months: Vec<YearMonth>,
    selection: FilterSelection,
    virtual_share: VirtualShareMap,
    broker: HighlightBroker,
    views: [ViewHighlight; 4],
    events_applied: usize,
}

impl Dashboard {
    /// Initialize on the most recent month with every other filter open.
    pub fn new(store: RecordStore, dimmed_opacity: f64) -> Self {
        let months = store.year_months();
        let selection = FilterSelection::initial(&months);
        let virtual_share = virtual_share_per_district_month(store.records());
        let broker = HighlightBroker::new();
        let views = ViewKind::ALL.map(|kind| broker.subscribe(kind, dimmed_opacity));

        info!(
            "Dashboard ready: {} records, {} months, {} district-month shares",
            store.len(),
            months.len(),
            virtual_share.len()
        );

        Self {
            store,
            months,
            selection,
            virtual_share,
            broker,
            views,
            events_applied: 0,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Sorted distinct months (the slider domain).
    pub fn months(&self) -> &[YearMonth] {
        &self.months
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub fn highlight(&self) -> HighlightState {
        self.broker.state()
    }

    pub fn virtual_share(&self) -> &VirtualShareMap {
        &self.virtual_share
    }

    pub fn events_applied(&self) -> usize {
        self.events_applied
    }

    /// Position of the selected month on the slider.
    pub fn slider_index(&self) -> Option<usize> {
        let selected = self.selection.year_month?;
        self.months.binary_search(&selected).ok()
    }

    /// Apply the startup selection. These events set the initial view and
    /// are not counted as interactions.
    pub fn apply_initial<I>(&mut self, events: I) -> Result<(), DashboardError>
    where
        I: IntoIterator<Item = DashboardEvent>,
    {
        let counted = self.events_applied;
        let result = events
            .into_iter()
            .try_for_each(|event| self.apply(event).map(|_| ()));
        self.events_applied = counted;
        result
    }

    /// Apply one event. Returns whether any state changed; on error the
    /// state is left untouched.
    pub fn apply(&mut self, event: DashboardEvent) -> Result<bool, DashboardError> {
        debug!("Applying event: {:?}", event);

        let changed = match event {
            DashboardEvent::Slider(index) => {
                let month = self.months.get(index).copied().ok_or(
                    DashboardError::SliderOutOfRange {
                        index,
                        len: self.months.len(),
                    },
                )?;
                replace(&mut self.selection.year_month, Some(month))
            }
            DashboardEvent::Month(month) => {
                if self.months.binary_search(&month).is_err() {
                    return Err(DashboardError::UnknownMonth(month));
                }
                replace(&mut self.selection.year_month, Some(month))
            }
            DashboardEvent::District(filter) => replace(&mut self.selection.district, filter),
            DashboardEvent::SchoolType(filter) => {
                replace(&mut self.selection.school_type, filter)
            }
            DashboardEvent::LearningModel(filter) => {
                replace(&mut self.selection.learning_model, filter)
            }
            DashboardEvent::Enrollment(range) => replace(&mut self.selection.enrollment, range),
            DashboardEvent::ClickMark(model) => {
                self.broker.dispatch(&mut Click::new(ClickTarget::Mark(model)))
            }
            DashboardEvent::ClickBackground => {
                self.broker.dispatch(&mut Click::new(ClickTarget::Background))
            }
            DashboardEvent::Reset => {
                let filters = replace(
                    &mut self.selection,
                    FilterSelection::initial(&self.months),
                );
                let highlight = self.broker.clear();
                filters || highlight
            }
        };

        self.events_applied += 1;
        Ok(changed)
    }

    fn view(&self, kind: ViewKind) -> &ViewHighlight {
        &self.views[kind as usize]
    }

    fn highlighted<T>(
        &self,
        kind: ViewKind,
        rows: Vec<T>,
        model: impl Fn(&T) -> &LearningModel,
    ) -> Vec<Highlighted<T>> {
        let view = self.view(kind);
        rows.into_iter()
            .map(|row| {
                let opacity = view.opacity(model(&row));
                Highlighted { row, opacity }
            })
            .collect()
    }

    /// Recompute the working set and every view from scratch.
    pub fn snapshot(&mut self) -> DashboardSnapshot {
        for view in self.views.iter_mut() {
            if view.has_changed() {
                let state = view.acknowledge();
                debug!("{:?} view re-rendering for highlight {}", view.kind(), state);
            }
        }

        let pipeline = FilterPipeline::new(&self.selection);
        let records = self.store.records();
        let working = pipeline.working_set(records);
        let timeline = pipeline.timeline_set(records);

        let groups = size_groups(&working);
        let counts = size_group_by_model(&working, &groups);
        let shares = model_enrollment_share(&working);
        let cells = cross_tab_type_model(&working);
        let points = enrollment_time_series(&timeline);

        let district_shares = self
            .selection
            .year_month
            .map(|month| self.virtual_share.for_month(month))
            .unwrap_or_default();

        debug!(
            "Working set: {} records, timeline set: {} records",
            working.len(),
            timeline.len()
        );

        DashboardSnapshot {
            selection: self.selection.clone(),
            month_label: self.selection.year_month.map(|m| m.label()),
            slider_index: self.slider_index(),
            slider_len: self.months.len(),
            highlight: self.broker.state(),
            working_set_size: working.len(),
            total_enrollment: working.iter().map(|r| r.enrollment_total).sum(),
            size_groups: groups,
            size_group_counts: self.highlighted(ViewKind::Bar, counts, |c| &c.learning_model),
            model_shares: self.highlighted(ViewKind::Bubble, shares, |s| &s.learning_model),
            district_shares,
            cross_tab: self.highlighted(ViewKind::Heatmap, cells, |c| &c.learning_model),
            time_series: self.highlighted(ViewKind::Timeline, points, |p| &p.learning_model),
        }
    }
}

/// Store `next` in `slot`, reporting whether the value changed.
fn replace<T: PartialEq>(slot: &mut T, next: T) -> bool {
    if *slot == next {
        false
    } else {
        *slot = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, RangeFilter};
    use crate::models::Record;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    /// Counts error-level events.
    struct ErrorCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for ErrorCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn record(y: i32, m: u32, school: &str, model: &str, district: &str, total: u64) -> Record {
        Record {
            time_period_start: NaiveDate::from_ymd_opt(y, m, 1).unwrap(),
            school_type: school.to_string(),
            learning_model: LearningModel::from(model),
            district_name: district.to_string(),
            enrollment_total: total,
        }
    }

    fn scenario() -> Dashboard {
        let store = RecordStore::new(vec![
            record(2021, 1, "TypeA", "Virtual", "D1", 100),
            record(2021, 1, "TypeA", "Hybrid", "D1", 50),
            record(2021, 2, "TypeA", "Virtual", "D1", 200),
        ]);
        Dashboard::new(store, 0.2)
    }

    #[test]
    fn test_initial_state_is_latest_month() {
        let mut dashboard = scenario();
        assert_eq!(dashboard.months().len(), 2);
        assert_eq!(dashboard.slider_index(), Some(1));

        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.month_label.as_deref(), Some("February 2021"));
        assert_eq!(snapshot.working_set_size, 1);
        assert_eq!(snapshot.highlight, HighlightState::Unselected);
        assert_eq!(snapshot.slider_len, 2);
    }

    #[test]
    fn test_slider_to_january_scenario() {
        let mut dashboard = scenario();
        assert!(dashboard.apply(DashboardEvent::Slider(0)).unwrap());

        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.working_set_size, 2);
        assert_eq!(snapshot.total_enrollment, 150);

        let virtual_share = snapshot
            .model_shares
            .iter()
            .find(|s| s.row.learning_model == LearningModel::Virtual)
            .unwrap();
        assert_eq!(virtual_share.row.percent, 66.67);

        let hybrid_share = snapshot
            .model_shares
            .iter()
            .find(|s| s.row.learning_model == LearningModel::Hybrid)
            .unwrap();
        assert_eq!(hybrid_share.row.percent, 33.33);
    }

    #[test]
    fn test_invalid_events_leave_state_untouched() {
        let mut dashboard = scenario();
        let before = dashboard.selection().clone();

        assert_eq!(
            dashboard.apply(DashboardEvent::Slider(9)),
            Err(DashboardError::SliderOutOfRange { index: 9, len: 2 })
        );
        let missing = YearMonth::new(2019, 5).unwrap();
        assert_eq!(
            dashboard.apply(DashboardEvent::Month(missing)),
            Err(DashboardError::UnknownMonth(missing))
        );
        assert_eq!(dashboard.selection(), &before);
        assert_eq!(dashboard.events_applied(), 0);
    }

    #[test]
    fn test_enrollment_filter_excludes_large_record() {
        let mut dashboard = scenario();
        dashboard
            .apply(DashboardEvent::Enrollment(RangeFilter::Range { min: 0, max: 199 }))
            .unwrap();

        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.working_set_size, 0);
        assert!(snapshot.time_series.iter().all(|p| p.row.value != 200));
        assert!(snapshot.model_shares.is_empty());
        assert!(snapshot.size_group_counts.iter().all(|c| c.row.count == 0));
    }

    #[test]
    fn test_highlight_dims_other_models_in_every_view() {
        let mut dashboard = scenario();
        dashboard.apply(DashboardEvent::Month(YearMonth::new(2021, 1).unwrap())).unwrap();
        assert!(dashboard
            .apply(DashboardEvent::ClickMark(LearningModel::Virtual))
            .unwrap());

        let snapshot = dashboard.snapshot();
        assert_eq!(
            snapshot.highlight,
            HighlightState::Selected(LearningModel::Virtual)
        );
        for share in &snapshot.model_shares {
            let expected = if share.row.learning_model == LearningModel::Virtual {
                1.0
            } else {
                0.2
            };
            assert_eq!(share.opacity, expected);
        }
        assert!(snapshot
            .cross_tab
            .iter()
            .any(|c| c.row.learning_model == LearningModel::Hybrid && c.opacity == 0.2));
        assert!(snapshot
            .time_series
            .iter()
            .filter(|p| p.row.learning_model == LearningModel::Virtual)
            .all(|p| p.opacity == 1.0));

        assert!(dashboard.apply(DashboardEvent::ClickBackground).unwrap());
        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.highlight, HighlightState::Unselected);
        assert!(snapshot.size_group_counts.iter().all(|c| c.opacity == 1.0));
    }

    #[test]
    fn test_timeline_ignores_time_filter() {
        let mut dashboard = scenario();
        dashboard
            .apply(DashboardEvent::District(Filter::Exact("D1".to_string())))
            .unwrap();
        let snapshot = dashboard.snapshot();

        assert_eq!(snapshot.working_set_size, 1);
        assert_eq!(snapshot.time_series.len(), 3);
    }

    #[test]
    fn test_district_shares_follow_selected_month() {
        let mut dashboard = scenario();
        let feb = dashboard.snapshot();
        assert_eq!(feb.district_shares.len(), 1);
        assert_eq!(feb.district_shares[0].percent_virtual, 100.0);

        dashboard.apply(DashboardEvent::Slider(0)).unwrap();
        let jan = dashboard.snapshot();
        assert!((jan.district_shares[0].percent_virtual - 100.0 * 100.0 / 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_restores_initial_selection() {
        let mut dashboard = scenario();
        dashboard.apply(DashboardEvent::Slider(0)).unwrap();
        dashboard
            .apply(DashboardEvent::LearningModel(Filter::Exact(LearningModel::Hybrid)))
            .unwrap();
        dashboard.apply(DashboardEvent::ClickMark(LearningModel::Hybrid)).unwrap();

        assert!(dashboard.apply(DashboardEvent::Reset).unwrap());
        assert_eq!(dashboard.selection(), &FilterSelection::initial(dashboard.months()));
        assert_eq!(dashboard.highlight(), HighlightState::Unselected);
        assert!(!dashboard.apply(DashboardEvent::Reset).unwrap());
    }

    #[test]
    fn test_snapshot_is_idempotent() {
        let mut dashboard = scenario();
        dashboard.apply(DashboardEvent::Slider(0)).unwrap();
        let a = serde_json::to_string(&dashboard.snapshot()).unwrap();
        let b = serde_json::to_string(&dashboard.snapshot()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_store() {
        let mut dashboard = Dashboard::new(RecordStore::default(), 0.2);
        assert!(dashboard.months().is_empty());
        assert_eq!(dashboard.slider_index(), None);

        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.working_set_size, 0);
        assert!(snapshot.district_shares.is_empty());
        assert!(snapshot.time_series.is_empty());
        assert_eq!(snapshot.size_groups.len(), 5);
    }

    #[test]
    fn test_empty_store_reports_error_diagnostic() {
        let errors = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(ErrorCounter(errors.clone()));

        let snapshot = tracing::subscriber::with_default(subscriber, || {
            Dashboard::new(RecordStore::default(), 0.2).snapshot()
        });

        assert_eq!(snapshot.working_set_size, 0);
        assert_eq!(snapshot.selection.year_month, None);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_initial_selection_is_not_counted_as_interaction() {
        let mut dashboard = scenario();
        dashboard
            .apply_initial(vec![
                DashboardEvent::Month(YearMonth::new(2021, 1).unwrap()),
                DashboardEvent::District(Filter::Unrestricted),
                DashboardEvent::ClickMark(LearningModel::Virtual),
            ])
            .unwrap();

        assert_eq!(dashboard.events_applied(), 0);
        assert_eq!(dashboard.slider_index(), Some(0));
        assert_eq!(
            dashboard.highlight(),
            HighlightState::Selected(LearningModel::Virtual)
        );

        dashboard.apply(DashboardEvent::Slider(1)).unwrap();
        assert_eq!(dashboard.events_applied(), 1);

        let missing = YearMonth::new(2019, 5).unwrap();
        assert_eq!(
            dashboard.apply_initial(vec![DashboardEvent::Month(missing)]),
            Err(DashboardError::UnknownMonth(missing))
        );
        assert_eq!(dashboard.events_applied(), 1);
    }
}
