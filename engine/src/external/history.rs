//! Historical observation store boundary
//!
//! The time-series storage layer is an external collaborator; the engine
//! only sees this interface. `MemoryHistory` backs tests and the demo
//! daemon.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use shared::{Location, Observation};

use crate::error::AppResult;

/// Read access to stored weather observations
#[async_trait]
pub trait HistoricalStore: Send + Sync {
    /// Observations for a location within [from, to], ordered by timestamp
    /// ascending. May be empty.
    async fn get_observations(
        &self,
        location: &Location,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Observation>>;

    /// The observation closest to midday of `date`, if the collector has
    /// delivered one. Used to reconcile past forecasts.
    async fn get_actual(
        &self,
        location: &Location,
        date: NaiveDate,
    ) -> AppResult<Option<Observation>>;
}

/// In-memory observation store keyed by location
#[derive(Debug, Default)]
pub struct MemoryHistory {
    observations: Mutex<HashMap<String, Vec<Observation>>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert observations, keeping each location's series time-ordered
    pub fn insert(&self, observations: impl IntoIterator<Item = Observation>) {
        let mut map = self.observations.lock().expect("history lock poisoned");
        let mut touched: Vec<String> = Vec::new();
        for obs in observations {
            let key = obs.location.cache_key();
            map.entry(key.clone()).or_default().push(obs);
            touched.push(key);
        }
        touched.sort();
        touched.dedup();
        for key in touched {
            if let Some(series) = map.get_mut(&key) {
                series.sort_by_key(|o| o.timestamp);
            }
        }
    }

    pub fn len(&self) -> usize {
        let map = self.observations.lock().expect("history lock poisoned");
        map.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoricalStore for MemoryHistory {
    async fn get_observations(
        &self,
        location: &Location,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Observation>> {
        let map = self.observations.lock().expect("history lock poisoned");
        let series = map.get(&location.cache_key());
        Ok(series
            .map(|s| {
                s.iter()
                    .filter(|o| o.timestamp >= from && o.timestamp <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_actual(
        &self,
        location: &Location,
        date: NaiveDate,
    ) -> AppResult<Option<Observation>> {
        let map = self.observations.lock().expect("history lock poisoned");
        let Some(series) = map.get(&location.cache_key()) else {
            return Ok(None);
        };
        let midday = date
            .and_hms_opt(12, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);
        Ok(series
            .iter()
            .filter(|o| o.timestamp.date_naive() == date)
            .min_by_key(|o| (o.timestamp - midday).num_seconds().abs())
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared::WeatherCondition;

    fn obs(hour: u32, temperature: f64) -> Observation {
        Observation {
            location: Location::new(47.6062, -122.3321, "Seattle", "United States"),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap(),
            temperature,
            humidity: 65.0,
            pressure: 1013.0,
            wind_speed: 5.0,
            wind_direction: 180.0,
            precipitation: 0.0,
            cloud_cover: 40.0,
            condition: WeatherCondition::Cloudy,
        }
    }

    #[tokio::test]
    async fn observations_are_filtered_and_ordered() {
        let store = MemoryHistory::new();
        store.insert([obs(12, 10.0), obs(8, 8.0), obs(20, 9.0)]);

        assert_eq!(store.len(), 3);
        let location = Location::new(47.6062, -122.3321, "Seattle", "United States");
        let from = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let result = store.get_observations(&location, from, to).await.unwrap();

        assert_eq!(result.len(), 2);
        assert!(result[0].timestamp < result[1].timestamp);
    }

    #[tokio::test]
    async fn get_actual_prefers_midday() {
        let store = MemoryHistory::new();
        store.insert([obs(2, 5.0), obs(13, 11.0), obs(23, 6.0)]);

        let location = Location::new(47.6062, -122.3321, "Seattle", "United States");
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let actual = store.get_actual(&location, date).await.unwrap().unwrap();

        assert_eq!(actual.temperature, 11.0);
    }

    #[tokio::test]
    async fn unknown_location_is_empty_not_error() {
        let store = MemoryHistory::new();
        let location = Location::new(0.0, 0.0, "Nowhere", "Atlantis");
        let result = store
            .get_observations(&location, Utc::now() - chrono::Duration::days(1), Utc::now())
            .await
            .unwrap();
        assert!(result.is_empty());
        assert!(store.get_actual(&location, Utc::now().date_naive()).await.unwrap().is_none());
    }
}
