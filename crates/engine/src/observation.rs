//! Demand observations and series preparation.

use serde::{Deserialize, Serialize};

use stockcast_core::{Period, SeriesKey, SkuCode, StoreCode};

use crate::error::{EngineError, EngineResult};

/// Demand recorded for one (sku, store) over one period.
///
/// Immutable once recorded. `observed = false` marks a period explicitly as
/// unobserved (e.g. store closed, feed outage): it carries no demand signal and
/// is skipped rather than treated as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandObservation {
    sku: SkuCode,
    store: StoreCode,
    period: Period,
    quantity: f64,
    #[serde(default = "observed_by_default")]
    observed: bool,
}

fn observed_by_default() -> bool {
    true
}

impl DemandObservation {
    pub fn new(sku: SkuCode, store: StoreCode, period: Period, quantity: f64) -> EngineResult<Self> {
        validate_quantity(quantity)?;
        Ok(Self {
            sku,
            store,
            period,
            quantity,
            observed: true,
        })
    }

    /// A period with no demand signal.
    pub fn unobserved(sku: SkuCode, store: StoreCode, period: Period) -> Self {
        Self {
            sku,
            store,
            period,
            quantity: 0.0,
            observed: false,
        }
    }

    pub fn sku(&self) -> &SkuCode {
        &self.sku
    }

    pub fn store(&self) -> &StoreCode {
        &self.store
    }

    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(self.sku.clone(), self.store.clone())
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn is_observed(&self) -> bool {
        self.observed
    }
}

fn validate_quantity(quantity: f64) -> EngineResult<()> {
    if !(quantity.is_finite() && quantity >= 0.0) {
        return Err(EngineError::forecast_input(format!(
            "demand quantity must be a finite non-negative number (got {quantity})"
        )));
    }
    Ok(())
}

/// A validated, gap-filled demand series ready for model fitting.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PreparedSeries {
    pub key: SeriesKey,
    /// Usable per-period demand, oldest first (gaps as zero, unobserved skipped).
    pub values: Vec<f64>,
    /// Period of the last observation, observed or not.
    pub last_period: Period,
}

/// Validate ordering/ownership and expand the raw observations into usable values.
///
/// Returns `None` for an empty input.
pub(crate) fn prepare_series(observations: &[DemandObservation]) -> EngineResult<Option<PreparedSeries>> {
    let Some(first) = observations.first() else {
        return Ok(None);
    };

    let key = first.key();
    let mut values = Vec::with_capacity(observations.len());
    let mut prev: Option<&Period> = None;

    for (idx, obs) in observations.iter().enumerate() {
        if obs.sku != key.sku || obs.store != key.store {
            return Err(EngineError::forecast_input(format!(
                "observation {idx} belongs to {}@{}, expected {key}",
                obs.sku, obs.store
            )));
        }

        if let Some(p) = prev {
            if obs.period.start() < p.end() {
                return Err(EngineError::forecast_input(format!(
                    "observation {idx} overlaps or precedes the previous period"
                )));
            }

            // Missing buckets between two recorded periods count as zero demand.
            let gap = (obs.period.start() - p.end()).num_seconds();
            let len = p.duration().num_seconds();
            if gap > 0 && len > 0 {
                let missing = (gap / len) as usize;
                values.extend(std::iter::repeat_n(0.0, missing));
            }
        }

        if obs.observed {
            validate_quantity(obs.quantity)?;
            values.push(obs.quantity);
        }
        prev = Some(&obs.period);
    }

    Ok(Some(PreparedSeries {
        key,
        values,
        last_period: observations[observations.len() - 1].period,
    }))
}
