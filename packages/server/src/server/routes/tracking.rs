//! Real-time drone tracking over WebSocket.
//!
//! GET /ws?token=JWT
//!
//! Browsers cannot set headers on a WebSocket handshake, so the token is read
//! from `?token=` first and the Authorization header second. Customers start
//! in their own room and merchants in their restaurant's room; further rooms
//! are joined with `{"action":"join","room":"merchant:<id>"}`.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Query,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamMap;
use tracing::{debug, info, warn};

use crate::common::{Actor, AuthError, RestaurantId, Role, UserId};
use crate::kernel::TrackingHub;
use crate::server::app::DroneAppState;
use crate::server::error::ApiError;
use crate::server::middleware::{authenticate, bearer_token};

const PING_INTERVAL: Duration = Duration::from_secs(30);

type Rooms = StreamMap<String, BroadcastStream<Value>>;

#[derive(Deserialize)]
pub struct TrackingQuery {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientCommand {
    Join { room: String },
    Leave { room: String },
}

pub async fn tracking_ws_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<DroneAppState>,
    Query(query): Query<TrackingQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .or_else(|| bearer_token(&headers))
        .ok_or(AuthError::AuthenticationRequired)?;
    let user = authenticate(&token, &state.deps.jwt_service).ok_or(AuthError::InvalidToken)?;
    let hub = state.deps.tracking.clone();

    Ok(ws.on_upgrade(move |socket| tracking_session(socket, user.actor, hub)))
}

/// Room a caller lands in on connect.
fn home_room(actor: &Actor) -> Option<String> {
    match actor.role {
        Role::Customer => Some(TrackingHub::customer_room(actor.user_id)),
        Role::Merchant => actor.restaurant_id.map(TrackingHub::merchant_room),
        Role::Admin => None,
    }
}

/// Customers see only their own room; merchant rooms belong to the
/// restaurant's operators and admins.
fn authorize_room(actor: &Actor, room: &str) -> Result<(), String> {
    if let Some(raw) = room.strip_prefix("customer:") {
        let user_id: UserId = raw.parse().map_err(|_| format!("malformed room {}", room))?;
        if user_id == actor.user_id || actor.is_admin() {
            return Ok(());
        }
        return Err(format!("not allowed to join {}", room));
    }
    if let Some(raw) = room.strip_prefix("merchant:") {
        let restaurant_id: RestaurantId =
            raw.parse().map_err(|_| format!("malformed room {}", room))?;
        if actor.operates(restaurant_id) {
            return Ok(());
        }
        return Err(format!("not allowed to join {}", room));
    }
    Err(format!("unknown room {}", room))
}

async fn join(rooms: &mut Rooms, hub: &TrackingHub, room: &str) {
    if !rooms.contains_key(room) {
        let rx = hub.subscribe(room).await;
        rooms.insert(room.to_string(), BroadcastStream::new(rx));
    }
}

/// Apply one client message and build the reply.
async fn handle_command(text: &str, actor: &Actor, hub: &TrackingHub, rooms: &mut Rooms) -> Value {
    let command = match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => command,
        Err(e) => return json!({ "type": "error", "message": format!("invalid command: {}", e) }),
    };

    match command {
        ClientCommand::Join { room } => match authorize_room(actor, &room) {
            Ok(()) => {
                join(rooms, hub, &room).await;
                debug!(user_id = %actor.user_id, room = %room, "Joined tracking room");
                json!({ "type": "joined", "room": room })
            }
            Err(message) => {
                warn!(user_id = %actor.user_id, room = %room, "Tracking room refused");
                json!({ "type": "error", "message": message })
            }
        },
        ClientCommand::Leave { room } => {
            if rooms.remove(&room).is_some() {
                hub.cleanup().await;
            }
            json!({ "type": "left", "room": room })
        }
    }
}

async fn tracking_session(socket: WebSocket, actor: Actor, hub: TrackingHub) {
    let (mut sender, mut receiver) = socket.split();
    let mut rooms = Rooms::new();

    if let Some(room) = home_room(&actor) {
        join(&mut rooms, &hub, &room).await;
    }
    let joined: Vec<&String> = rooms.keys().collect();
    let connected = json!({ "type": "connected", "userId": actor.user_id, "rooms": joined });
    if sender.send(Message::Text(connected.to_string())).await.is_err() {
        return;
    }
    info!(user_id = %actor.user_id, role = ?actor.role, "Tracking client connected");

    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        tokio::select! {
            _ = ping.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            Some((room, item)) = rooms.next(), if !rooms.is_empty() => {
                let outgoing = match item {
                    Ok(value) => value,
                    Err(BroadcastStreamRecvError::Lagged(missed)) => {
                        warn!(user_id = %actor.user_id, room = %room, missed, "Tracking client lagged");
                        json!({ "type": "lagged", "room": room, "missed": missed })
                    }
                };
                if sender.send(Message::Text(outgoing.to_string())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = handle_command(&text, &actor, &hub, &mut rooms).await;
                    if sender.send(Message::Text(reply.to_string())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(user_id = %actor.user_id, error = %e, "Tracking socket error");
                    break;
                }
            },
        }
    }

    drop(rooms);
    hub.cleanup().await;
    info!(user_id = %actor.user_id, "Tracking client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::TestDependencies;

    #[test]
    fn test_customer_joins_only_own_room() {
        let customer = TestDependencies::customer();
        assert!(authorize_room(&customer, &TrackingHub::customer_room(customer.user_id)).is_ok());
        assert!(authorize_room(&customer, &TrackingHub::customer_room(UserId::new())).is_err());
        assert!(authorize_room(&customer, &TrackingHub::merchant_room(RestaurantId::new())).is_err());
    }

    #[test]
    fn test_merchant_rooms_follow_operator_rights() {
        let own = RestaurantId::new();
        let merchant = TestDependencies::merchant_of(own);
        assert!(authorize_room(&merchant, &TrackingHub::merchant_room(own)).is_ok());
        assert!(authorize_room(&merchant, &TrackingHub::merchant_room(RestaurantId::new())).is_err());

        let admin = TestDependencies::admin();
        assert!(authorize_room(&admin, &TrackingHub::merchant_room(own)).is_ok());
    }

    #[test]
    fn test_unknown_or_malformed_rooms_rejected() {
        let admin = TestDependencies::admin();
        assert!(authorize_room(&admin, "orders:all").is_err());
        assert!(authorize_room(&admin, "merchant:not-a-uuid").is_err());
    }

    #[tokio::test]
    async fn test_join_then_receive_then_leave() {
        let hub = TrackingHub::new();
        let own = RestaurantId::new();
        let merchant = TestDependencies::merchant_of(own);
        let room = TrackingHub::merchant_room(own);
        let mut rooms = Rooms::new();

        let reply = handle_command(
            &json!({ "action": "join", "room": room }).to_string(),
            &merchant,
            &hub,
            &mut rooms,
        )
        .await;
        assert_eq!(reply["type"], "joined");

        hub.publish(&room, json!({ "type": "drone:update" })).await;
        let (from, item) = rooms.next().await.unwrap();
        assert_eq!(from, room);
        assert_eq!(item.unwrap()["type"], "drone:update");

        let reply = handle_command(
            &json!({ "action": "leave", "room": room }).to_string(),
            &merchant,
            &hub,
            &mut rooms,
        )
        .await;
        assert_eq!(reply["type"], "left");
        assert!(rooms.is_empty());
        assert_eq!(hub.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_garbage_command_gets_error_reply() {
        let hub = TrackingHub::new();
        let mut rooms = Rooms::new();
        let reply = handle_command("{\"action\":\"dance\"}", &TestDependencies::admin(), &hub, &mut rooms).await;
        assert_eq!(reply["type"], "error");
    }
}
