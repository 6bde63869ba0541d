mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use classroom::infra::razorpay::hmac_sha256_hex;
use common::{TestApp, KEY_SECRET, WEBHOOK_SECRET};
use serde_json::{json, Value};

async fn published_course(app: &TestApp, admin_token: &str, price: &str) -> i64 {
    let (status, course) = app
        .post(
            "/api/admin/courses",
            admin_token,
            json!({
                "name": "Physics",
                "price": price,
                "validity_type": "lifetime",
                "is_published": true
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{course}");
    course["id"].as_i64().unwrap()
}

async fn fixed_coupon(app: &TestApp, admin_token: &str, code: &str, value: &str) -> i64 {
    let (status, coupon) = app
        .post(
            "/api/admin/coupons",
            admin_token,
            json!({
                "name": "Launch offer",
                "code": code,
                "discount_type": "fixed",
                "discount_value": value,
                "start_at": "2020-01-01T00:00:00Z",
                "lifetime": true,
                "is_all_courses": true
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{coupon}");
    coupon["id"].as_i64().unwrap()
}

fn signature(order_id: &str, payment_id: &str) -> String {
    hmac_sha256_hex(KEY_SECRET, format!("{order_id}|{payment_id}").as_bytes()).unwrap()
}

#[tokio::test]
async fn test_purchase_and_verify_course() {
    let app = TestApp::spawn().await;
    let (_, admin) = app.admin().await;
    let (_, student) = app.student("s1@example.com", "9811111111").await;
    let course_id = published_course(&app, &admin, "1000.00").await;

    let (status, checkout) = app
        .post("/api/payments/purchase-course", &student, json!({ "course_id": course_id }))
        .await;
    assert_eq!(status, StatusCode::OK, "{checkout}");
    // 1000 + 18% GST on (1000 + 10 + 10) + 20 charges
    assert_eq!(checkout["amount"], 120360);
    assert_eq!(checkout["order_id"], "order_test_1");
    assert_eq!(checkout["key"], "rzp_test_key");
    assert_eq!(checkout["prefill"]["contact"], "+919811111111");

    let verify = json!({
        "razorpay_order_id": "order_test_1",
        "razorpay_payment_id": "pay_1",
        "razorpay_signature": signature("order_test_1", "pay_1"),
    });
    let (status, body) = app.post("/api/payments/verify-payment", &student, verify.clone()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "Payment verified successfully.");
    assert_eq!(body["transaction"]["payment_status"], "completed");

    // verifying again is a no-op
    let (status, body) = app.post("/api/payments/verify-payment", &student, verify).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transaction"]["payment_id"], "pay_1");

    let (status, transactions) = app.get("/api/payments/student-transactions", &student).await;
    assert_eq!(status, StatusCode::OK);
    let transactions = transactions.as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["content_name"], "Physics");
}

#[tokio::test]
async fn test_coupon_discount_and_usage_count() {
    let app = TestApp::spawn().await;
    let (_, admin) = app.admin().await;
    let (_, student) = app.student("s2@example.com", "9822222222").await;
    let course_id = published_course(&app, &admin, "1000").await;
    let coupon_id = fixed_coupon(&app, &admin, "SAVE100", "100").await;

    let (status, quote) = app
        .post(
            "/api/payments/apply-coupon",
            &student,
            json!({ "course_id": course_id, "coupon_code": "SAVE100" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{quote}");
    assert_eq!(quote["coupon_code"], "SAVE100");

    let (_, checkout) = app
        .post(
            "/api/payments/purchase-course",
            &student,
            json!({ "course_id": course_id, "coupon_code": "SAVE100" }),
        )
        .await;
    // 900 + 18% GST on 920 + 20 charges
    assert_eq!(checkout["amount"], 108560);

    let (_, coupon) = app.get(&format!("/api/admin/coupons/{coupon_id}"), &admin).await;
    assert_eq!(coupon["total_applied"], 0);

    let verify = json!({
        "razorpay_order_id": "order_test_1",
        "razorpay_payment_id": "pay_2",
        "razorpay_signature": signature("order_test_1", "pay_2"),
    });
    app.post("/api/payments/verify-payment", &student, verify.clone()).await;
    app.post("/api/payments/verify-payment", &student, verify).await;

    let (_, coupon) = app.get(&format!("/api/admin/coupons/{coupon_id}"), &admin).await;
    assert_eq!(coupon["total_applied"], 1);

    // a used coupon is frozen
    let (status, body) = app
        .request(
            axum::http::Method::DELETE,
            &format!("/api/admin/coupons/{coupon_id}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["non_field_errors"],
        "This coupon has already been used and cannot be deleted."
    );
}

#[tokio::test]
async fn test_unknown_coupon_rejected() {
    let app = TestApp::spawn().await;
    let (_, admin) = app.admin().await;
    let (_, student) = app.student("s3@example.com", "9833333333").await;
    let course_id = published_course(&app, &admin, "500").await;

    let (status, body) = app
        .post(
            "/api/payments/apply-coupon",
            &student,
            json!({ "course_id": course_id, "coupon_code": "NOPE" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": { "coupon_code": "Invalid coupon code." }, "status": false }));
}

#[tokio::test]
async fn test_bad_signature_fails_transaction() {
    let app = TestApp::spawn().await;
    let (_, admin) = app.admin().await;
    let (_, student) = app.student("s4@example.com", "9844444444").await;
    let course_id = published_course(&app, &admin, "1000").await;
    app.post("/api/payments/purchase-course", &student, json!({ "course_id": course_id }))
        .await;

    let (status, body) = app
        .post(
            "/api/payments/verify-payment",
            &student,
            json!({
                "razorpay_order_id": "order_test_1",
                "razorpay_payment_id": "pay_3",
                "razorpay_signature": "deadbeef",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["non_field_errors"], "Signature verification failed.");

    let (_, transactions) = app.get("/api/admin/transactions", &admin).await;
    assert_eq!(transactions[0]["payment_status"], "failed");

    // unknown order
    let (status, body) = app
        .post(
            "/api/payments/verify-payment",
            &student,
            json!({
                "razorpay_order_id": "order_missing",
                "razorpay_payment_id": "pay_4",
                "razorpay_signature": "deadbeef",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["non_field_errors"], "Transaction does not exist.");
}

#[tokio::test]
async fn test_unpublished_course_cannot_be_bought() {
    let app = TestApp::spawn().await;
    let (_, admin) = app.admin().await;
    let (_, student) = app.student("s5@example.com", "9855555555").await;
    let course_id = published_course(&app, &admin, "1000").await;

    let (status, body) = app
        .request(
            axum::http::Method::PATCH,
            &format!("/api/admin/courses/{course_id}/toggle-publish"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Course unpublished successfully.");

    let (status, body) = app
        .post("/api/payments/purchase-course", &student, json!({ "course_id": course_id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["course_id"], "Invalid or unpublished course ID.");

    // pricing goes through the same checks as purchasing
    let (status, body) = app
        .get(&format!("/api/payments/course-pricing/{course_id}"), &student)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["course_id"], "Invalid or unpublished course ID.");
}

#[tokio::test]
async fn test_printed_test_series_purchase_and_delivery() {
    let app = TestApp::spawn().await;
    let (_, admin) = app.admin().await;
    let (_, student) = app.student("s7@example.com", "9877777777").await;

    let (status, series) = app
        .post(
            "/api/admin/test-series",
            &admin,
            json!({
                "name": "Printed mocks",
                "price": "500",
                "discounted_price": "400",
                "is_digital": false,
                "is_published": true,
                "gst": 0
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{series}");
    let series_id = series["id"].as_i64().unwrap();

    let (_, available) = app.get("/api/student/available-test-series?is_digital=false", &student).await;
    assert_eq!(available[0]["id"], series_id);

    let (status, checkout) = app
        .post(
            "/api/payments/purchase-test-series",
            &student,
            json!({ "test_series_id": series_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{checkout}");
    // 400 + 10 + 10 charges, no GST
    assert_eq!(checkout["amount"], 42000);

    let (status, _) = app
        .post(
            "/api/payments/verify-payment",
            &student,
            json!({
                "razorpay_order_id": "order_test_1",
                "razorpay_payment_id": "pay_print",
                "razorpay_signature": signature("order_test_1", "pay_print"),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, purchased) = app.get("/api/student/purchased-test-series", &student).await;
    assert_eq!(purchased.as_array().unwrap().len(), 1);
    let (_, available) = app.get("/api/student/available-test-series", &student).await;
    assert_eq!(available, json!([]));

    let (status, orders) = app.get("/api/admin/product-orders", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders.as_array().unwrap().len(), 1);
    assert_eq!(orders[0]["delivery_status"], "delivery-pending");
    assert_eq!(orders[0]["test_series_name"], "Printed mocks");
    assert_eq!(orders[0]["phone_number"], "+919877777777");
    let order_id = orders[0]["id"].as_i64().unwrap();

    let (status, body) = app
        .request(
            axum::http::Method::PATCH,
            &format!("/api/admin/product-orders/{order_id}/update-status"),
            Some(&admin),
            Some(json!({ "delivery_status": "shipped" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Delivery status updated successfully.");
    assert_eq!(body["delivery_status"], "shipped");

    let (status, body) = app
        .request(
            axum::http::Method::PATCH,
            &format!("/api/admin/product-orders/{order_id}/update-status"),
            Some(&admin),
            Some(json!({ "delivery_status": "lost" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["delivery_status"]
        .as_str()
        .unwrap()
        .starts_with("Invalid status."));

    let (_, pending) = app
        .get("/api/admin/product-orders?delivery_status=delivery-pending", &admin)
        .await;
    assert_eq!(pending, json!([]));
}

async fn webhook(app: &TestApp, payload: &Value, signature: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks/razorpay")
        .header("content-type", "application/json")
        .header("X-Razorpay-Signature", signature)
        .body(Body::from(payload.to_string()))
        .unwrap();
    app.send(request).await
}

#[tokio::test]
async fn test_captured_webhook_completes_payment() {
    let app = TestApp::spawn().await;
    let (_, admin) = app.admin().await;
    let (_, student) = app.student("s6@example.com", "9866666666").await;
    let course_id = published_course(&app, &admin, "1000").await;
    app.post("/api/payments/purchase-course", &student, json!({ "course_id": course_id }))
        .await;

    let payload = json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": { "id": "pay_hook", "order_id": "order_test_1" } } }
    });
    let (status, _) = webhook(&app, &payload, "not-a-signature").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let good = hmac_sha256_hex(WEBHOOK_SECRET, payload.to_string().as_bytes()).unwrap();
    let (status, body) = webhook(&app, &payload, &good).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "success");

    let (_, transactions) = app.get("/api/payments/student-transactions", &student).await;
    assert_eq!(transactions[0]["payment_id"], "pay_hook");

    let other = json!({ "event": "order.paid", "payload": {} });
    let sig = hmac_sha256_hex(WEBHOOK_SECRET, other.to_string().as_bytes()).unwrap();
    let (_, body) = webhook(&app, &other, &sig).await;
    assert_eq!(body["message"], "ignored");
}
