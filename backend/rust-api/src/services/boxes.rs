//! Pending cash boxes: open sales from before today, grouped by local day.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::database::{SaleStore, SharedStore, StoreError};
use crate::models::{Sale, SaleFilter, SaleOrder, SaleStatus, UserId};
use crate::utils::BusinessCalendar;

/// One unclosed day. `date` is that of the day's first sale in arrival order,
/// not necessarily its earliest.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingBox {
    pub date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub count: usize,
    pub sales: Vec<Sale>,
}

pub struct BoxAggregator {
    store: SharedStore,
    calendar: BusinessCalendar,
}

impl BoxAggregator {
    pub fn new(store: SharedStore, calendar: BusinessCalendar) -> Self {
        Self { store, calendar }
    }

    pub async fn pending_boxes(&self, owner: UserId) -> Result<Vec<PendingBox>, StoreError> {
        self.pending_boxes_at(owner, Utc::now()).await
    }

    pub async fn pending_boxes_at(
        &self,
        owner: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PendingBox>, StoreError> {
        let filter = SaleFilter {
            status: Some(SaleStatus::Open),
            from: None,
            until: Some(self.calendar.start_of_today(now)),
            order: SaleOrder::Arrival,
        };
        let sales = self.store.list_sales(owner, &filter).await?;
        Ok(group_by_day(&self.calendar, sales))
    }
}

/// Expects `sales` in arrival order; returns the oldest day first.
pub fn group_by_day(calendar: &BusinessCalendar, sales: Vec<Sale>) -> Vec<PendingBox> {
    let mut days: BTreeMap<(i32, u32, u32), PendingBox> = BTreeMap::new();

    for sale in sales {
        let key = calendar.day_key(sale.date);
        let entry = days.entry(key).or_insert_with(|| PendingBox {
            date: sale.date,
            total_amount: Decimal::ZERO,
            count: 0,
            sales: Vec::new(),
        });
        entry.total_amount += sale.amount;
        entry.count += 1;
        entry.sales.push(sale);
    }

    days.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SaleType;
    use chrono::TimeZone;
    use uuid::Uuid;

    #[test]
    fn groups_by_local_day_oldest_first() {
        let calendar = BusinessCalendar::from_offset_minutes(-180).unwrap();
        let owner = Uuid::new_v4();
        let sale = |amount: i64, at: DateTime<Utc>| {
            Sale::new(owner, Decimal::from(amount), SaleType::Cash, String::new(), at)
        };

        // 02:00 UTC on the 9th is still the 8th locally.
        let late_night = Utc.with_ymd_and_hms(2024, 5, 9, 2, 0, 0).unwrap();
        let morning = Utc.with_ymd_and_hms(2024, 5, 9, 12, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2024, 5, 8, 20, 0, 0).unwrap();

        let boxes = group_by_day(
            &calendar,
            vec![sale(30, morning), sale(50, evening), sale(75, late_night)],
        );

        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].total_amount, Decimal::from(125));
        assert_eq!(boxes[0].count, 2);
        assert_eq!(boxes[0].date, evening);
        assert_eq!(boxes[1].total_amount, Decimal::from(30));
    }

    #[test]
    fn nothing_pending_is_an_empty_report() {
        let calendar = BusinessCalendar::from_offset_minutes(0).unwrap();
        assert!(group_by_day(&calendar, Vec::new()).is_empty());
    }
}
