mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::{json, Value};
use tableside_api::entities::order::{ActiveModel as OrderActiveModel, Entity as OrderEntity};
use tableside_api::services::reconciliation::{
    expected_signature, ReconciliationService, WebhookNotification,
};
use uuid::Uuid;

use common::{decimal_field, response_json, TestApp};

async fn place_order(app: &TestApp, table_number: i32) -> Value {
    let table = app.seed_table(table_number).await;
    let latte = app.seed_product("Iced Latte", dec!(25000)).await;
    let croissant = app.seed_product("Croissant", dec!(32000)).await;

    let payload = json!({
        "table_id": table.id,
        "items": [
            { "product_id": latte.id, "quantity": 2 },
            { "product_id": croissant.id, "quantity": 1 }
        ]
    });

    let response = app
        .request(Method::POST, "/orders", Some(payload), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response).await["data"].clone()
}

fn notification(order_id: &str, transaction_status: &str, fraud_status: Option<&str>) -> Value {
    let mut body = json!({
        "order_id": order_id,
        "status_code": "200",
        "gross_amount": "82000.00",
        "signature_key": "not-checked-outside-production",
        "transaction_status": transaction_status,
        "transaction_id": "tx-9f2b",
        "payment_type": "qris"
    });
    if let Some(fraud) = fraud_status {
        body["fraud_status"] = json!(fraud);
    }
    body
}

#[tokio::test]
async fn settlement_with_accepted_fraud_confirms_the_order() {
    let app = TestApp::new().await;
    let order = place_order(&app, 5).await;
    let order_number = order["order_number"].as_str().unwrap();

    assert_eq!(order["status"], "pending");
    assert_eq!(order["payment_status"], "pending");
    assert_eq!(decimal_field(&order["total_amount"]), dec!(82000));

    let response = app
        .request(
            Method::POST,
            "/webhooks/payment",
            Some(notification(order_number, "settlement", Some("accept"))),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["order"]["order_number"], order_number);
    assert_eq!(body["order"]["status"], "confirmed");
    assert_eq!(body["order"]["payment_status"], "paid");

    // The order record carries the gateway transaction details afterwards.
    let uri = format!("/orders/{}", order["id"].as_str().unwrap());
    let response = app.request(Method::GET, &uri, None, None).await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "confirmed");
    assert_eq!(body["data"]["payment_status"], "paid");
    assert_eq!(body["data"]["payment_method"], "qris");
    assert_eq!(body["data"]["gateway_transaction_id"], "tx-9f2b");
}

#[tokio::test]
async fn duplicate_settlement_for_paid_order_is_acknowledged_unchanged() {
    let app = TestApp::new().await;
    let order = place_order(&app, 7).await;
    let order_number = order["order_number"].as_str().unwrap();

    for expectation in ["Order updated successfully", "Order already processed"] {
        let response = app
            .request(
                Method::POST,
                "/webhooks/payment",
                Some(notification(order_number, "settlement", Some("accept"))),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_json(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], expectation);
        assert_eq!(body["order"]["payment_status"], "paid");
        assert_eq!(body["order"]["status"], "confirmed");
    }
}

#[tokio::test]
async fn status_mapping_covers_failure_and_refund_paths() {
    let cases = [
        ("deny", "failed", "cancelled"),
        ("cancel", "failed", "cancelled"),
        ("expire", "failed", "cancelled"),
        ("refund", "refunded", "cancelled"),
        ("pending", "pending", "pending"),
    ];

    for (transaction_status, payment_status, order_status) in cases {
        let app = TestApp::new().await;
        let order = place_order(&app, 1).await;
        let order_number = order["order_number"].as_str().unwrap();

        let response = app
            .request(
                Method::POST,
                "/webhooks/payment",
                Some(notification(order_number, transaction_status, None)),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_json(response).await;
        assert_eq!(body["order"]["payment_status"], payment_status);
        assert_eq!(body["order"]["status"], order_status);
    }
}

#[tokio::test]
async fn capture_with_unaccepted_fraud_leaves_the_order_untouched() {
    let app = TestApp::new().await;
    let order = place_order(&app, 1).await;
    let order_number = order["order_number"].as_str().unwrap();

    let response = app
        .request(
            Method::POST,
            "/webhooks/payment",
            Some(notification(order_number, "capture", Some("challenge"))),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["message"], "No status change applied");
    assert_eq!(body["order"]["payment_status"], "pending");
    assert_eq!(body["order"]["status"], "pending");
}

#[tokio::test]
async fn order_resolution_falls_back_to_gateway_reference_and_primary_key() {
    let app = TestApp::new().await;
    let order = place_order(&app, 1).await;
    let order_id = order["id"].as_str().unwrap();

    // A primary-key-shaped id that matches no order number must still resolve.
    let response = app
        .request(
            Method::POST,
            "/webhooks/payment",
            Some(notification(order_id, "pending", None)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Re-point the gateway reference away from the order number and deliver
    // against it.
    let row = OrderEntity::find_by_id(Uuid::parse_str(order_id).unwrap())
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: OrderActiveModel = row.into();
    active.gateway_order_id = Set("GW-REF-1234".to_string());
    active.update(&*app.state.db).await.unwrap();

    let response = app
        .request(
            Method::POST,
            "/webhooks/payment",
            Some(notification("GW-REF-1234", "settlement", Some("accept"))),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["order"]["payment_status"], "paid");
}

#[tokio::test]
async fn unknown_order_answers_404() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/webhooks/payment",
            Some(notification("ORDER-0000000000000-0", "settlement", None)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = response_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("Order not found"));
}

#[tokio::test]
async fn non_json_content_type_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request_raw(
            Method::POST,
            "/webhooks/payment",
            b"order_id=ORDER-1".to_vec(),
            &[("content-type", "application/x-www-form-urlencoded")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let app = TestApp::with_config(|cfg| {
        cfg.webhook_max_body_bytes = 256;
    })
    .await;

    let mut body = notification("ORDER-1", "settlement", Some("accept"));
    body["padding"] = json!("x".repeat(512));

    let response = app
        .request(Method::POST, "/webhooks/payment", Some(body), None)
        .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn malformed_payloads_are_rejected() {
    let app = TestApp::new().await;

    // Missing required signature_key
    let response = app
        .request(
            Method::POST,
            "/webhooks/payment",
            Some(json!({
                "order_id": "ORDER-1",
                "status_code": "200",
                "gross_amount": "1000.00",
                "transaction_status": "settlement"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown transaction_status value
    let response = app
        .request(
            Method::POST,
            "/webhooks/payment",
            Some(notification("ORDER-1", "teleported", None)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_rate_limit_rejects_excess_calls_from_one_ip() {
    let app = TestApp::with_config(|cfg| {
        cfg.webhook_rate_limit_requests = 3;
    })
    .await;
    let order = place_order(&app, 1).await;
    let order_number = order["order_number"].as_str().unwrap();

    // The first three calls inside the window process normally (the second
    // and third short-circuit as duplicates, which still counts as success).
    for _ in 0..3 {
        let response = app
            .request(
                Method::POST,
                "/webhooks/payment",
                Some(notification(order_number, "settlement", Some("accept"))),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    // The fourth is rejected before any validation runs, payload regardless.
    let response = app
        .request_raw(
            Method::POST,
            "/webhooks/payment",
            b"not even json".to_vec(),
            &[("content-type", "text/plain")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn signature_mismatch_is_logged_but_not_fatal() {
    let app = TestApp::new().await;
    let order = place_order(&app, 1).await;
    let order_number = order["order_number"].as_str().unwrap().to_string();

    // Production-mode reconciliation with a configured key and a wrong
    // signature still processes the notification.
    let service = ReconciliationService::new(
        app.state.db.clone(),
        Some("server-key".to_string()),
        true,
    );

    let outcome = service
        .process(
            WebhookNotification {
                order_id: order_number.clone(),
                status_code: "200".to_string(),
                gross_amount: "82000.00".to_string(),
                signature_key: "definitely-wrong".to_string(),
                transaction_status: tableside_api::models::TransactionStatus::Settlement,
                fraud_status: Some("accept".to_string()),
                transaction_id: None,
                payment_type: Some("qris".to_string()),
            },
            "203.0.113.9",
        )
        .await
        .expect("mismatched signature must not block processing");

    assert!(outcome.changed);
    assert_eq!(outcome.payment_status, "paid");

    // And the matching signature is accepted the same way.
    let expected = expected_signature(&order_number, "200", "82000.00", "server-key");
    assert_eq!(expected.len(), 128);
}
