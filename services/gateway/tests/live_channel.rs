mod common;

use common::{next_json, send_text, spawn_app};
use tokio_tungstenite::{connect_async, tungstenite};

#[tokio::test]
async fn bad_token_is_refused_before_upgrade() {
    let app = spawn_app().await;

    let err = connect_async(format!("{}/v1/live?token=sg_at_bogus", app.ws_url))
        .await
        .unwrap_err();
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 401),
        other => panic!("expected an HTTP rejection, got {other:?}"),
    }

    let err = connect_async(format!("{}/v1/live", app.ws_url))
        .await
        .unwrap_err();
    assert!(matches!(err, tungstenite::Error::Http(_)));
}

#[tokio::test]
async fn two_users_contend_for_one_slot() {
    let app = spawn_app().await;
    let ada_token = app.sign_up("ada").await;
    let bob_token = app.sign_up("bob").await;
    let mut ada = app.join_live(&ada_token).await;
    let mut bob = app.join_live(&bob_token).await;

    send_text(&mut ada, r#"{"event":"book-slot","data":{"slotTime":"14:00"}}"#).await;
    for socket in [&mut ada, &mut bob] {
        let event = next_json(socket).await;
        assert_eq!(event["event"], "slot-updated");
        assert_eq!(event["data"]["slotTime"], "14:00");
        assert_eq!(event["data"]["slotDate"], "2026-03-14");
        assert_eq!(event["data"]["username"], "ada");
    }

    send_text(
        &mut bob,
        r#"{"event":"book-slot","data":{"slotTime":"14:00","slotPeriod":"PM"}}"#,
    )
    .await;
    let reply = next_json(&mut bob).await;
    assert_eq!(reply["event"], "booking-error");
    assert_eq!(reply["data"]["message"], "Slot already booked by ada");

    send_text(&mut ada, r#"{"event":"book-slot","data":{"slotTime":"14:00"}}"#).await;
    let reply = next_json(&mut ada).await;
    assert_eq!(reply["data"]["message"], "You already booked this slot");

    send_text(&mut bob, r#"{"event":"unbook-slot","data":{"slotTime":"14:00"}}"#).await;
    let reply = next_json(&mut bob).await;
    assert_eq!(reply["data"]["message"], "You can only unbook your own slot");

    send_text(&mut bob, r#"{"event":"book-slot","data":{"slotTime":"14:10"}}"#).await;
    let reply = next_json(&mut bob).await;
    assert_eq!(reply["data"]["message"], "Invalid slot selected");

    send_text(&mut ada, r#"{"event":"unbook-slot","data":{"slotTime":"14:00"}}"#).await;
    for socket in [&mut ada, &mut bob] {
        let event = next_json(socket).await;
        assert_eq!(event["event"], "slot-cleared");
        assert_eq!(event["data"]["slotTime"], "14:00");
    }

    send_text(&mut bob, r#"{"event":"book-slot","data":{"slotTime":"14:00"}}"#).await;
    for socket in [&mut ada, &mut bob] {
        let event = next_json(socket).await;
        assert_eq!(event["event"], "slot-updated");
        assert_eq!(event["data"]["username"], "bob");
    }
}

#[tokio::test]
async fn rest_bookings_reach_the_live_group() {
    let app = spawn_app().await;
    let ada_token = app.sign_up("ada").await;
    let bob_token = app.sign_up("bob").await;
    let mut watcher = app.join_live(&bob_token).await;

    assert_eq!(app.book(&ada_token, "16:30").await.status(), 201);
    let event = next_json(&mut watcher).await;
    assert_eq!(event["event"], "slot-updated");
    assert_eq!(event["data"]["slotTime"], "16:30");

    let resp = app
        .client
        .delete(app.url("/v1/bookings/16:30"))
        .bearer_auth(&ada_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let event = next_json(&mut watcher).await;
    assert_eq!(event["event"], "slot-cleared");
}

#[tokio::test]
async fn logged_out_token_cannot_connect() {
    let app = spawn_app().await;
    let token = app.sign_up("ada").await;

    let resp = app
        .client
        .post(app.url("/v1/auth/logout"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let err = connect_async(format!("{}/v1/live?token={token}", app.ws_url))
        .await
        .unwrap_err();
    assert!(matches!(err, tungstenite::Error::Http(_)));
}
