mod common;

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseBackend, EntityTrait, QueryFilter, Statement};
use serde_json::json;
use std::str::FromStr;
use tableside_api::entities::order::{self, Entity as OrderEntity};
use tableside_api::entities::order_item::{Column as OrderItemColumn, Entity as OrderItemEntity};
use tableside_api::services::orders::{CreateOrderInput, NewOrderItem};
use uuid::Uuid;

use common::{decimal_field, response_json, TestApp};

#[tokio::test]
async fn create_order_prices_items_against_current_menu() {
    let app = TestApp::new().await;
    let table = app.seed_table(5).await;
    let latte = app.seed_product("Iced Latte", dec!(25000)).await;
    let croissant = app.seed_product("Croissant", dec!(32000)).await;

    let payload = json!({
        "table_id": table.id,
        "items": [
            { "product_id": latte.id, "quantity": 2, "customizations": {"sugar": "less"} },
            { "product_id": croissant.id, "quantity": 1 }
        ],
        "notes": "no cutlery"
    });

    let response = app
        .request(Method::POST, "/orders", Some(payload), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert!(body["success"].as_bool().unwrap());
    let data = &body["data"];
    assert_eq!(data["status"], "pending");
    assert_eq!(data["payment_status"], "pending");
    assert_eq!(data["items"].as_array().unwrap().len(), 2);
    assert_eq!(data["table"]["table_number"], 5);
    // Guest order: no user attached
    assert!(data["user_id"].is_null());

    let order_number = data["order_number"].as_str().unwrap();
    assert!(order_number.starts_with("ORDER-"));
    assert_eq!(data["gateway_order_id"].as_str().unwrap(), order_number);

    let saved = OrderEntity::find()
        .filter(order::Column::OrderNumber.eq(order_number))
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("order should persist");
    assert_eq!(saved.total_amount, Decimal::from_str("82000").unwrap());
}

#[tokio::test]
async fn unknown_products_are_dropped_from_total_and_items() {
    let app = TestApp::new().await;
    let table = app.seed_table(2).await;
    let latte = app.seed_product("Latte", dec!(20000)).await;

    let payload = json!({
        "table_id": table.id,
        "items": [
            { "product_id": latte.id, "quantity": 1 },
            { "product_id": Uuid::new_v4(), "quantity": 3 }
        ]
    });

    let response = app
        .request(Method::POST, "/orders", Some(payload), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    let data = &body["data"];
    assert_eq!(data["items"].as_array().unwrap().len(), 1);
    assert_eq!(decimal_field(&data["total_amount"]), dec!(20000));
}

#[tokio::test]
async fn order_with_no_resolvable_products_still_persists_with_zero_total() {
    let app = TestApp::new().await;
    let table = app.seed_table(3).await;

    let payload = json!({
        "table_id": table.id,
        "items": [
            { "product_id": Uuid::new_v4(), "quantity": 1 },
            { "product_id": Uuid::new_v4(), "quantity": 2 }
        ]
    });

    let response = app
        .request(Method::POST, "/orders", Some(payload), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    let data = &body["data"];
    assert_eq!(decimal_field(&data["total_amount"]), Decimal::ZERO);
    assert!(data["items"].as_array().unwrap().is_empty());

    let order_id = Uuid::parse_str(data["id"].as_str().unwrap()).unwrap();
    let saved = OrderEntity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap();
    assert!(saved.is_some());
}

#[tokio::test]
async fn inactive_or_unknown_table_is_rejected() {
    let app = TestApp::new().await;
    let latte = app.seed_product("Latte", dec!(20000)).await;

    let payload = json!({
        "table_id": Uuid::new_v4(),
        "items": [{ "product_id": latte.id, "quantity": 1 }]
    });

    let response = app
        .request(Method::POST, "/orders", Some(payload), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("Invalid table"));
}

#[tokio::test]
async fn failed_item_insert_rolls_the_order_back() {
    let app = TestApp::new().await;
    let table = app.seed_table(4).await;
    let latte = app.seed_product("Latte", dec!(20000)).await;

    // Force the item insert to fail mid-transaction.
    app.state
        .db
        .execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            "DROP TABLE order_items".to_string(),
        ))
        .await
        .unwrap();

    let result = app
        .state
        .services
        .orders
        .create_order(CreateOrderInput {
            table_id: table.id,
            items: vec![NewOrderItem {
                product_id: latte.id,
                quantity: 1,
                customizations: None,
                notes: None,
            }],
            notes: None,
            user_id: None,
        })
        .await;

    assert!(result.is_err());

    let orders = OrderEntity::find().all(&*app.state.db).await.unwrap();
    assert!(orders.is_empty(), "order row must not survive the rollback");
}

#[tokio::test]
async fn signed_in_customer_is_attached_to_the_order() {
    let app = TestApp::new().await;
    let table = app.seed_table(6).await;
    let latte = app.seed_product("Latte", dec!(20000)).await;
    let customer = app.seed_profile("customer").await;
    let token = app.issue_token(customer.id);

    let payload = json!({
        "table_id": table.id,
        "items": [{ "product_id": latte.id, "quantity": 1 }]
    });

    let response = app
        .request(Method::POST, "/orders", Some(payload), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(
        body["data"]["user_id"].as_str().unwrap(),
        customer.id.to_string()
    );
}

#[tokio::test]
async fn list_orders_filters_by_user_and_status() {
    let app = TestApp::new().await;
    let table = app.seed_table(1).await;
    let latte = app.seed_product("Latte", dec!(20000)).await;
    let customer = app.seed_profile("customer").await;
    let token = app.issue_token(customer.id);

    let payload = json!({
        "table_id": table.id,
        "items": [{ "product_id": latte.id, "quantity": 1 }]
    });
    // One order for the customer, one guest order
    app.request(Method::POST, "/orders", Some(payload.clone()), Some(&token))
        .await;
    app.request(Method::POST, "/orders", Some(payload), None)
        .await;

    let response = app
        .request(
            Method::GET,
            &format!("/orders?user_id={}", customer.id),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let response = app
        .request(Method::GET, "/orders?status=pending", None, None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let response = app
        .request(Method::GET, "/orders?status=confirmed", None, None)
        .await;
    let body = response_json(response).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let response = app
        .request(Method::GET, "/orders?status=shipped", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_order_returns_projection_or_404() {
    let app = TestApp::new().await;
    let table = app.seed_table(1).await;
    let latte = app.seed_product("Latte", dec!(20000)).await;

    let payload = json!({
        "table_id": table.id,
        "items": [{ "product_id": latte.id, "quantity": 2 }]
    });
    let response = app
        .request(Method::POST, "/orders", Some(payload), None)
        .await;
    let created = response_json(response).await;
    let order_id = created["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(Method::GET, &format!("/orders/{}", order_id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["items"][0]["product_name"], "Latte");
    assert_eq!(decimal_field(&body["data"]["items"][0]["line_total"]), dec!(40000));

    let response = app
        .request(
            Method::GET,
            &format!("/orders/{}", Uuid::new_v4()),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn order_patch_is_gated_to_owner_or_staff() {
    let app = TestApp::new().await;
    let table = app.seed_table(1).await;
    let latte = app.seed_product("Latte", dec!(20000)).await;
    let owner = app.seed_profile("customer").await;
    let other = app.seed_profile("customer").await;
    let admin = app.seed_profile("admin").await;

    let payload = json!({
        "table_id": table.id,
        "items": [{ "product_id": latte.id, "quantity": 1 }]
    });
    let response = app
        .request(
            Method::POST,
            "/orders",
            Some(payload),
            Some(&app.issue_token(owner.id)),
        )
        .await;
    let created = response_json(response).await;
    let order_uri = format!("/orders/{}", created["data"]["id"].as_str().unwrap());

    // No credentials
    let response = app
        .request(
            Method::PATCH,
            &order_uri,
            Some(json!({"status": "cancelled"})),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A different customer
    let response = app
        .request(
            Method::PATCH,
            &order_uri,
            Some(json!({"status": "cancelled"})),
            Some(&app.issue_token(other.id)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The owner may cancel their own order
    let response = app
        .request(
            Method::PATCH,
            &order_uri,
            Some(json!({"status": "cancelled"})),
            Some(&app.issue_token(owner.id)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "cancelled");

    // Staff may move it along
    let response = app
        .request(
            Method::PATCH,
            &order_uri,
            Some(json!({"status": "preparing", "notes": "remake"})),
            Some(&app.issue_token(admin.id)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "preparing");
    assert_eq!(body["data"]["notes"], "remake");
}

#[tokio::test]
async fn order_items_snapshot_prices_at_creation_time() {
    let app = TestApp::new().await;
    let table = app.seed_table(9).await;
    let latte = app.seed_product("Latte", dec!(20000)).await;

    let payload = json!({
        "table_id": table.id,
        "items": [{ "product_id": latte.id, "quantity": 1 }]
    });
    let response = app
        .request(Method::POST, "/orders", Some(payload), None)
        .await;
    let created = response_json(response).await;
    let order_id = Uuid::parse_str(created["data"]["id"].as_str().unwrap()).unwrap();

    // Reprice the product after the order was placed.
    let mut product: tableside_api::entities::product::ActiveModel =
        tableside_api::entities::product::Entity::find_by_id(latte.id)
            .one(&*app.state.db)
            .await
            .unwrap()
            .unwrap()
            .into();
    product.price = sea_orm::Set(dec!(99000));
    sea_orm::ActiveModelTrait::update(product, &*app.state.db)
        .await
        .unwrap();

    let items = OrderItemEntity::find()
        .filter(OrderItemColumn::OrderId.eq(order_id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].unit_price, dec!(20000));

    let order_row = OrderEntity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order_row.total_amount, dec!(20000));
}
