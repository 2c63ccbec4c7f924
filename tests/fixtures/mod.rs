//! Test fixtures for visit-planner.
//!
//! Provides:
//! - a `StoreBuilder` with sensible defaults
//! - deterministic store layouts around a home base in Las Vegas
//! - calendars and config helpers

#![allow(dead_code)]

use chrono::NaiveDate;

use visit_planner::calendar::WeekdayCalendar;
use visit_planner::geo::Coordinates;
use visit_planner::traits::CalendarBuilder;
use visit_planner::{PlannerConfig, Store, StoreId, WorkingDay};

/// Office near the Strip used as home base.
pub const HOME: Coordinates = Coordinates::new(36.1147, -115.1728);

const KM_PER_DEGREE: f64 = 111.32;

/// Real retail locations around the Strip and Henderson.
pub const RETAIL: &[(&str, f64, f64)] = &[
    ("Fashion Show Mall", 36.1274, -115.1704),
    ("Forum Shops", 36.1176, -115.1752),
    ("Miracle Mile Shops", 36.1101, -115.1716),
    ("Grand Canal Shoppes", 36.1215, -115.1696),
    ("Town Square", 36.0716, -115.1755),
    ("Boulevard Mall", 36.1297, -115.1221),
    ("Meadows Mall", 36.1690, -115.1960),
    ("Galleria at Sunset", 36.0622, -115.0396),
    ("Downtown Summerlin", 36.1507, -115.3329),
    ("Las Vegas North Premium Outlets", 36.1631, -115.1580),
];

#[derive(Clone, Debug)]
pub struct StoreBuilder {
    store: Store,
}

impl StoreBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            store: Store {
                id: StoreId::new(id),
                name: format!("Store {}", id),
                retailer: "Acme".to_string(),
                district: "Strip".to_string(),
                location: HOME,
                sales_volume: 1000.0,
                priority_class: 1,
                base_frequency: 1.0,
                visit_duration_minutes: None,
            },
        }
    }

    pub fn at(mut self, location: Coordinates) -> Self {
        self.store.location = location;
        self
    }

    pub fn frequency(mut self, frequency: f64) -> Self {
        self.store.base_frequency = frequency;
        self
    }

    pub fn priority(mut self, class: u8) -> Self {
        self.store.priority_class = class;
        self
    }

    pub fn duration(mut self, minutes: u32) -> Self {
        self.store.visit_duration_minutes = Some(minutes);
        self
    }

    pub fn build(self) -> Store {
        self.store
    }
}

/// Point `dx_km` east and `dy_km` north of `origin`.
pub fn offset(origin: Coordinates, dx_km: f64, dy_km: f64) -> Coordinates {
    Coordinates::new(
        origin.lat + dy_km / KM_PER_DEGREE,
        origin.lng + dx_km / (KM_PER_DEGREE * origin.lat.to_radians().cos()),
    )
}

/// `n` points spread evenly over a disc (sunflower layout).
pub fn disc(center: Coordinates, radius_km: f64, n: usize) -> Vec<Coordinates> {
    const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;
    (0..n)
        .map(|i| {
            let r = radius_km * ((i as f64 + 0.5) / n as f64).sqrt();
            let theta = i as f64 * GOLDEN_ANGLE;
            offset(center, r * theta.cos(), r * theta.sin())
        })
        .collect()
}

/// Stores on a disc, ids prefixed with `prefix`.
pub fn stores_on_disc(prefix: &str, center: Coordinates, radius_km: f64, n: usize, frequency: f64) -> Vec<Store> {
    disc(center, radius_km, n)
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            StoreBuilder::new(&format!("{}-{:03}", prefix, i))
                .at(p)
                .frequency(frequency)
                .priority((i % 3) as u8 + 1)
                .build()
        })
        .collect()
}

/// A mixed portfolio: named malls plus suburban stores with varied cadence.
pub fn portfolio() -> Vec<Store> {
    let mut stores: Vec<Store> = RETAIL
        .iter()
        .enumerate()
        .map(|(i, (name, lat, lng))| {
            let mut store = StoreBuilder::new(&format!("mall-{}", i))
                .at(Coordinates::new(*lat, *lng))
                .frequency(2.0)
                .duration(40)
                .build();
            store.name = name.to_string();
            store
        })
        .collect();

    let frequencies = [0.5, 1.0, 1.0, 2.0, 3.0, 0.25];
    for (i, p) in disc(HOME, 15.0, 90).into_iter().enumerate() {
        stores.push(
            StoreBuilder::new(&format!("sub-{:03}", i))
                .at(p)
                .frequency(frequencies[i % frequencies.len()])
                .priority((i % 4) as u8 + 1)
                .build(),
        );
    }
    stores
}

pub fn march_2026() -> Vec<WorkingDay> {
    WeekdayCalendar::new().working_days(2026, 3)
}

pub fn first_days(n: usize) -> Vec<WorkingDay> {
    let mut days = WeekdayCalendar::new().working_days(2026, 3);
    days.extend(WeekdayCalendar::new().working_days(2026, 4));
    days.truncate(n);
    days
}

pub fn config() -> PlannerConfig {
    PlannerConfig {
        home_base: HOME,
        ..PlannerConfig::default()
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
