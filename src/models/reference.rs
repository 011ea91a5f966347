use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schedule;

/// Catalog entry. Owned by catalog management; the engine only reads it to
/// enrich draft items and to check shelf-life.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub shelf_life_days: Option<u32>,
}

impl Product {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            shelf_life_days: None,
        }
    }

    pub fn with_shelf_life(mut self, days: u32) -> Self {
        self.shelf_life_days = Some(days);
        self
    }
}

/// Weekly route pattern for a customer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    #[serde(default)]
    pub weekdays: Vec<Weekday>,
    /// First day of the week this plan applies from.
    #[serde(default)]
    pub effective_from: Option<NaiveDate>,
}

impl RoutePlan {
    pub fn new(weekdays: impl IntoIterator<Item = Weekday>) -> Self {
        let mut plan = Self::default();
        for day in weekdays {
            if !plan.weekdays.contains(&day) {
                plan.weekdays.push(day);
            }
        }
        plan
    }

    pub fn effective_from(mut self, week_start: NaiveDate) -> Self {
        self.effective_from = Some(week_start);
        self
    }

    pub fn days_until_next(&self, today: Weekday) -> i64 {
        schedule::days_until_next_route(&self.weekdays, today)
    }

    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        self.effective_from.map_or(true, |from| date >= from)
    }

    /// Days until the next route visit as seen on `today`. A plan that has
    /// not taken effect yet contributes no route days.
    pub fn lookahead_days(&self, today: NaiveDate) -> i64 {
        if self.is_effective_on(today) {
            self.days_until_next(today.weekday())
        } else {
            schedule::DEFAULT_LOOKAHEAD_DAYS
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub route: RoutePlan,
}

impl Customer {
    pub fn new(id: Uuid, route: RoutePlan) -> Self {
        Self {
            id,
            name: None,
            route,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_plan_deduplicates_weekdays() {
        let plan = RoutePlan::new([Weekday::Mon, Weekday::Fri, Weekday::Mon]);
        assert_eq!(plan.weekdays, vec![Weekday::Mon, Weekday::Fri]);
        assert_eq!(plan.days_until_next(Weekday::Wed), 2);
    }

    #[test]
    fn plan_not_yet_effective_uses_default_lookahead() {
        // 2024-03-06 is a Wednesday.
        let today = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        let plan = RoutePlan::new([Weekday::Mon, Weekday::Fri])
            .effective_from(NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert_eq!(plan.lookahead_days(today), schedule::DEFAULT_LOOKAHEAD_DAYS);

        let plan = plan.effective_from(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(plan.lookahead_days(today), 2);
    }

    #[test]
    fn customer_deserializes_weekday_codes() {
        let json = r#"{"id":"8d6f1f0e-8c1e-4f55-9a53-3a3c7d4b2f10","route":{"weekdays":["Mon","Fri"]}}"#;
        let customer: Customer = serde_json::from_str(json).unwrap();
        assert_eq!(customer.route.weekdays, vec![Weekday::Mon, Weekday::Fri]);
        assert!(customer.route.effective_from.is_none());
    }
}
