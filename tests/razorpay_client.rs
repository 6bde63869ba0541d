use classroom::app::ports::PaymentGatewayPort;
use classroom::config::RazorpayConfig;
use classroom::error::ClassroomError;
use classroom::infra::razorpay::RazorpayClient;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> RazorpayClient {
    RazorpayClient::new(RazorpayConfig {
        base_url: server.uri(),
        key_id: "rzp_test_key".into(),
        key_secret: "secret".into(),
        webhook_secret: "hook".into(),
    })
    .unwrap()
}

#[tokio::test]
async fn test_create_order_sends_paise_with_auto_capture() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({
            "amount": 120360,
            "currency": "INR",
            "receipt": "rcpt_1",
            "payment_capture": 1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_abc",
            "entity": "order",
            "amount": 120360,
            "currency": "INR",
            "status": "created"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let order = client(&server).create_order(120360, "INR", "rcpt_1").await.unwrap();
    assert_eq!(order.id, "order_abc");
    assert_eq!(order.amount, 120360);
    assert_eq!(order.currency, "INR");
}

#[tokio::test]
async fn test_gateway_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": "BAD_REQUEST_ERROR", "description": "Authentication failed" }
        })))
        .mount(&server)
        .await;

    let err = client(&server).create_order(100, "INR", "rcpt_2").await.unwrap_err();
    assert!(matches!(err, ClassroomError::Gateway { service: "razorpay", .. }));
}
