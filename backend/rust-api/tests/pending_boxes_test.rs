// Pending cash boxes: open sales from previous local days, grouped per day

use chrono::Duration;
use rust_decimal::Decimal;
use uuid::Uuid;
use verdustock_api::database::SaleStore;
use verdustock_api::models::{Sale, SaleType};

use test_helpers::*;

async fn add_sale(app: &TestApp, owner: Uuid, amount: i64, date: chrono::DateTime<chrono::Utc>) -> Sale {
    let sale = Sale::new(owner, Decimal::from(amount), SaleType::Cash, String::new(), date);
    app.store.insert_sale(&sale).await.unwrap();
    sale
}

#[tokio::test]
async fn test_groups_open_past_sales_oldest_first() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    // Noon local time (UTC-3).
    let now = at("2024-05-20T15:00:00Z");

    let three_days_ago = now - Duration::days(3);
    let two_days_ago = now - Duration::days(2);
    let first = add_sale(&app, owner, 50, three_days_ago).await;
    add_sale(&app, owner, 20, two_days_ago).await;
    add_sale(&app, owner, 75, three_days_ago + Duration::hours(1)).await;
    // Open but today: not pending.
    add_sale(&app, owner, 999, now - Duration::hours(1)).await;

    let boxes = app.state.boxes.pending_boxes_at(owner, now).await.unwrap();

    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes[0].total_amount, Decimal::from(125));
    assert_eq!(boxes[0].count, 2);
    assert_eq!(boxes[0].date, first.date);
    assert_eq!(boxes[0].sales.len(), 2);
    assert_eq!(boxes[1].total_amount, Decimal::from(20));
    assert_eq!(boxes[1].count, 1);
}

#[tokio::test]
async fn test_box_date_is_first_arrival_not_earliest() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let now = at("2024-05-20T15:00:00Z");

    // A sync pass writes newest first: 17:00 local lands before 10:00 local.
    let afternoon = add_sale(&app, owner, 40, at("2024-05-17T20:00:00Z")).await;
    let morning = add_sale(&app, owner, 15, at("2024-05-17T13:00:00Z")).await;
    let older_day = add_sale(&app, owner, 5, at("2024-05-16T18:00:00Z")).await;

    let boxes = app.state.boxes.pending_boxes_at(owner, now).await.unwrap();

    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes[0].date, older_day.date);
    assert_eq!(boxes[1].date, afternoon.date);
    assert_eq!(boxes[1].total_amount, Decimal::from(55));
    let ids: Vec<Uuid> = boxes[1].sales.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![afternoon.id, morning.id]);
}

#[tokio::test]
async fn test_today_starts_at_local_midnight() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    // 01:00 local on the 20th.
    let now = at("2024-05-20T04:00:00Z");

    // 23:30 local on the 19th: yesterday, pending.
    add_sale(&app, owner, 10, at("2024-05-20T02:30:00Z")).await;
    // 00:30 local on the 20th: today, not pending.
    add_sale(&app, owner, 30, at("2024-05-20T03:30:00Z")).await;

    let boxes = app.state.boxes.pending_boxes_at(owner, now).await.unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0].total_amount, Decimal::from(10));
}

#[tokio::test]
async fn test_closed_sales_and_other_merchants_excluded() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let now = at("2024-05-20T15:00:00Z");
    add_sale(&app, owner, 40, now - Duration::days(1)).await;
    app.state.ledger.close_box(owner).await.unwrap();
    add_sale(&app, Uuid::new_v4(), 40, now - Duration::days(1)).await;

    let boxes = app.state.boxes.pending_boxes_at(owner, now).await.unwrap();
    assert!(boxes.is_empty());
}
