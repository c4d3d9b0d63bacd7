//! End-to-end flows through `ReplenishmentService` on in-memory stores.

use chrono::{DateTime, Duration, TimeZone, Utc};

use stockcast_core::{Period, SeriesKey, SkuCode, StoreCode};
use stockcast_engine::{
    CostModel, DemandObservation, EngineConfig, EngineError, ErrorKind, ForecastRequest,
    PolicyRequest, ReorderUrgency, Scenario, ScenarioFilter, ScenarioStatus,
};
use stockcast_infra::{ReplenishmentService, ScenarioBatchRunner, ServiceError, Stores};

const HISTORY: [f64; 8] = [10.0, 12.0, 9.0, 11.0, 10.0, 13.0, 9.0, 12.0];

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
}

fn now() -> DateTime<Utc> {
    t0() + Duration::days(HISTORY.len() as i64)
}

fn key() -> SeriesKey {
    SeriesKey::new(
        SkuCode::new("SKU-1001").unwrap(),
        StoreCode::new("STORE-7").unwrap(),
    )
}

fn series(sku: &str) -> SeriesKey {
    SeriesKey::new(SkuCode::new(sku).unwrap(), StoreCode::new("STORE-7").unwrap())
}

fn observation(day: i64, qty: f64) -> DemandObservation {
    observation_for(key(), day, qty)
}

fn observation_for(key: SeriesKey, day: i64, qty: f64) -> DemandObservation {
    DemandObservation::new(
        key.sku,
        key.store,
        Period::days_from(t0() + Duration::days(day), 1).unwrap(),
        qty,
    )
    .unwrap()
}

fn service() -> ReplenishmentService {
    stockcast_observability::init();
    let config = EngineConfig::new(CostModel::new(0.2, 15.0));
    let service = ReplenishmentService::new(config, Stores::in_memory()).unwrap();
    for (day, qty) in HISTORY.iter().enumerate() {
        service
            .stores()
            .history
            .record_observation(observation(day as i64, *qty))
            .unwrap();
    }
    service
}

fn planned() -> ReplenishmentService {
    let service = service();
    service
        .plan(
            &key(),
            t0(),
            now(),
            &ForecastRequest::new(1, now()),
            &PolicyRequest::new(14, 0.9, 160.0, now()),
        )
        .unwrap();
    service
}

#[test]
fn plan_derives_policy_from_the_fresh_forecast() {
    let service = service();
    let (forecast, policy) = service
        .plan(
            &key(),
            t0(),
            now(),
            &ForecastRequest::new(1, now()),
            &PolicyRequest::new(14, 0.9, 160.0, now()),
        )
        .unwrap();

    assert!((forecast.mean_demand - 10.75).abs() < 1e-9);
    assert!((forecast.p90 - 12.66).abs() < 0.05);
    assert_eq!(policy.forecast_ref, forecast.reference());
    assert!(policy.reorder_point >= policy.safety_stock);

    let stores = service.stores();
    assert_eq!(stores.forecasts.latest(&key()).unwrap(), Some(forecast));
    assert_eq!(stores.policies.latest(&key()).unwrap(), Some(policy));
}

#[test]
fn policy_refresh_needs_a_forecast() {
    let service = service();
    let err = service
        .refresh_policy(&key(), &service.default_policy_request(10.0, now()))
        .unwrap_err();
    assert!(matches!(err, ServiceError::MissingForecast(k) if k == key()));
}

#[test]
fn short_history_is_reported_and_nothing_is_saved() {
    let service = service();
    let err = service
        .refresh_forecast(&key(), t0(), t0() + Duration::days(2), &ForecastRequest::new(1, now()))
        .unwrap_err();

    match err {
        ServiceError::Engine(e) => {
            assert_eq!(e.kind(), ErrorKind::NotEnoughHistory);
            assert!(matches!(e, EngineError::InsufficientData { required: 3, available: 2 }));
        }
        other => panic!("expected engine error, got {other:?}"),
    }
    assert!(service.stores().forecasts.latest(&key()).unwrap().is_none());
}

#[test]
fn later_refresh_supersedes_earlier_forecast() {
    let service = planned();
    service
        .stores()
        .history
        .record_observation(observation(8, 30.0))
        .unwrap();
    let later = now() + Duration::days(1);
    let refreshed = service
        .refresh_forecast(&key(), t0(), later, &ForecastRequest::new(1, later))
        .unwrap();

    assert!(refreshed.mean_demand > 10.75);
    assert_eq!(
        service.stores().forecasts.latest(&key()).unwrap().map(|f| f.generated_at),
        Some(later)
    );
}

#[test]
fn scenario_run_persists_snapshots_and_result() {
    let service = planned();
    let draft = service
        .create_scenario(Scenario::draft("Supplier delay", "two extra weeks", 14, 0.0, now()).unwrap())
        .unwrap();

    let execution = service.run_scenario(&draft, &key(), now()).unwrap();
    let result = execution.outcome.as_ref().unwrap();
    assert_eq!(result.effective_lead_time_days, 28);
    assert!(result.stockout_risk_pct > result.baseline_stockout_risk_pct);

    let listed = service.list_scenarios(&ScenarioFilter::any()).unwrap();
    assert_eq!(listed.len(), 1);
    assert!(matches!(listed[0].status(), ScenarioStatus::Completed { run_id, .. } if *run_id == result.run_id));

    let results = service.scenario_results(draft.id_typed()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].run_id, result.run_id);
}

#[test]
fn zero_perturbation_reproduces_the_baseline() {
    let service = planned();
    let draft = Scenario::draft("Control", "", 0, 0.0, now()).unwrap();

    let execution = service.run_scenario(&draft, &key(), now()).unwrap();
    let result = execution.outcome.unwrap();
    let baseline = service.stores().policies.latest(&key()).unwrap().unwrap();

    assert_eq!(result.stockout_risk_pct, result.baseline_stockout_risk_pct);
    assert!(result.cost_impact.abs() < 1e-9);
    assert_eq!(result.adjusted_policy.safety_stock, baseline.safety_stock);
    assert_eq!(result.adjusted_policy.reorder_point, baseline.reorder_point);
}

#[test]
fn failed_simulation_ends_in_failed_snapshot() {
    let service = planned();
    let draft = Scenario::draft("Impossible", "", -30, 0.0, now()).unwrap();

    let execution = service.run_scenario(&draft, &key(), now()).unwrap();
    assert!(matches!(execution.outcome, Err(EngineError::InvalidScenario(_))));

    let failed = service
        .list_scenarios(&ScenarioFilter::any().with_state("failed"))
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert!(service.scenario_results(draft.id_typed()).unwrap().is_empty());
}

#[test]
fn scenario_without_baseline_is_rejected() {
    let service = service();
    let draft = Scenario::draft("Promo", "", 0, 20.0, now()).unwrap();
    assert!(matches!(
        service.run_scenario(&draft, &key(), now()),
        Err(ServiceError::MissingPolicy(_))
    ));
}

#[test]
fn batch_of_scenarios_is_persisted_in_order() {
    let service = planned().with_runner(ScenarioBatchRunner::new(2));
    let scenarios: Vec<Scenario> = [(0, 10.0), (7, 0.0), (3, -20.0), (-20, 0.0)]
        .into_iter()
        .map(|(lead, demand)| Scenario::draft(format!("lead {lead} demand {demand}"), "", lead, demand, now()).unwrap())
        .collect();

    let outcomes = service.run_scenarios(&scenarios, &key(), now()).unwrap();
    assert_eq!(outcomes.len(), 4);

    for (scenario, outcome) in scenarios.iter().zip(&outcomes) {
        let execution = outcome.as_ref().unwrap();
        assert_eq!(execution.final_snapshot().unwrap().id_typed(), scenario.id_typed());
    }
    assert!(outcomes[3].as_ref().unwrap().outcome.is_err());

    assert_eq!(service.list_scenarios(&ScenarioFilter::any().with_state("completed")).unwrap().len(), 3);
    assert_eq!(service.list_scenarios(&ScenarioFilter::any().with_state("failed")).unwrap().len(), 1);
}

#[test]
fn recorded_actuals_feed_accuracy_summary() {
    let service = planned();
    assert!(service.accuracy_summary(&key()).unwrap().is_none());

    // Day 8 is the one-day horizon of the planned forecast.
    let record = service
        .record_actual(observation(8, 12.0), now() + Duration::days(1))
        .unwrap()
        .expect("covered period is scored");
    assert!((record.forecast_demand - 10.75).abs() < 1e-9);
    assert!((record.bias - (10.75 - 12.0) / 12.0 * 100.0).abs() < 1e-9);

    let summary = service.accuracy_summary(&key()).unwrap().unwrap();
    assert_eq!(summary.records_used, 1);
    assert!((summary.accuracy_pct - (100.0 - record.absolute_pct_error)).abs() < 1e-9);
    assert!(!summary.needs_retraining);
}

#[test]
fn actuals_outside_the_horizon_are_stored_but_not_scored() {
    let service = planned();
    let outcome = service
        .record_actual(observation(12, 11.0), now() + Duration::days(5))
        .unwrap();

    assert!(outcome.is_none());
    let stored = service
        .stores()
        .history
        .fetch_observations(&key(), t0(), now() + Duration::days(30))
        .unwrap();
    assert_eq!(stored.len(), HISTORY.len() + 1);
    assert!(service.accuracy_summary(&key()).unwrap().is_none());
}

#[test]
fn scoring_against_a_past_forecast_before_period_closes_is_premature() {
    let service = planned();
    let forecast = service.stores().forecasts.latest(&key()).unwrap().unwrap();

    let err = service
        .score_actual(&forecast, &observation(9, 10.0), now())
        .unwrap_err();
    match err {
        ServiceError::Engine(e) => assert!(e.is_retryable_later()),
        other => panic!("expected premature check, got {other:?}"),
    }
}

#[test]
fn duplicate_actuals_conflict() {
    let service = planned();
    let err = service.record_actual(observation(3, 99.0), now()).unwrap_err();
    assert!(matches!(err, ServiceError::Repository(_)));
}

#[test]
fn batch_plan_orders_series_by_urgency_then_order_value() {
    let service = service();
    for sku in ["SKU-2002", "SKU-3003"] {
        for (day, qty) in HISTORY.iter().enumerate() {
            service
                .stores()
                .history
                .record_observation(observation_for(series(sku), day as i64, *qty))
                .unwrap();
        }
    }

    let request = |stock: f64, unit_cost: f64| PolicyRequest::new(14, 0.9, stock, now()).with_unit_cost(unit_cost);
    let batch = [
        (key(), request(0.0, 1.0)),
        (series("SKU-9009"), request(0.0, 1.0)),
        (series("SKU-3003"), request(100.0, 50.0)),
        (series("SKU-2002"), request(0.0, 3.0)),
    ];
    let planned = service.plan_batch(&batch, t0(), now(), &ForecastRequest::new(1, now()));

    let order: Vec<&str> = planned.iter().map(|p| p.key.sku.as_str()).collect();
    assert_eq!(order, ["SKU-2002", "SKU-1001", "SKU-3003", "SKU-9009"]);

    let urgencies: Vec<_> = planned.iter().filter_map(|p| p.policy().map(|policy| policy.urgency)).collect();
    assert_eq!(urgencies, [ReorderUrgency::Critical, ReorderUrgency::Critical, ReorderUrgency::Medium]);

    let top = planned[0].policy().unwrap();
    assert!((top.order_value.unwrap() - 3.0 * top.suggested_order_qty).abs() < 1e-9);
    assert!(matches!(planned[3].outcome, Err(ServiceError::Engine(_))));

    // Successful series were persisted; the failing one left nothing behind.
    assert!(service.stores().policies.latest(&series("SKU-2002")).unwrap().is_some());
    assert!(service.stores().forecasts.latest(&series("SKU-9009")).unwrap().is_none());
}

#[test]
fn hourly_history_plans_with_daily_lead_times() {
    let service = service();
    let hourly = series("SKU-4004");
    for hour in 0..48 {
        let period = Period::starting_at(t0() + Duration::hours(hour), Duration::hours(1)).unwrap();
        let observation = DemandObservation::new(hourly.sku.clone(), hourly.store.clone(), period, 10.0).unwrap();
        service.stores().history.record_observation(observation).unwrap();
    }

    let until = t0() + Duration::hours(48);
    let (forecast, policy) = service
        .plan(
            &hourly,
            t0(),
            until,
            &ForecastRequest::new(24, until),
            &PolicyRequest::new(7, 0.9, 0.0, until),
        )
        .unwrap();

    assert!((forecast.period_days - 1.0 / 24.0).abs() < 1e-12);
    assert!((policy.reorder_point - 10.0 * 24.0 * 7.0).abs() < 1e-6);
    assert_eq!(policy.urgency, ReorderUrgency::Critical);
}
