//! Operation dispatch
//!
//! [`RpcFacade`] maps `(object, operation, params)` requests onto the
//! [`MediaServer`] and turns results into JSON values and errors into
//! stable codes.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info_span, Instrument};

use rmedia_media_core::{
    ConnectionId, CreateParams, EventType, MediaError, MediaServer, ObjectId, Role, SubscriptionId,
};
use rmedia_sdp_core::{parse_sdp, render_sdp, CapabilityDescription};

use crate::error::{Result, RpcError};
use crate::protocol::{RpcNotification, RpcRequest, RpcResponse};
use crate::session::{ClientSession, SessionRegistry};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(flatten)]
    params: CreateParams,
}

#[derive(Debug, Deserialize)]
struct NameRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TagRequest {
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct SubscribeRequest {
    #[serde(rename = "type")]
    event_type: EventType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnsubscribeRequest {
    subscription_id: SubscriptionId,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateConnectionRequest {
    role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionRequest {
    connection_id: ConnectionId,
}

/// A capability description given either as structured JSON or as SDP text
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptionRequest {
    connection_id: ConnectionId,
    #[serde(default)]
    spec: Option<CapabilityDescription>,
    #[serde(default)]
    sdp: Option<String>,
}

impl DescriptionRequest {
    fn into_parts(self) -> Result<(ConnectionId, CapabilityDescription)> {
        match (self.spec, self.sdp) {
            (Some(spec), None) => Ok((self.connection_id, spec)),
            (None, Some(sdp)) => Ok((self.connection_id, parse_sdp(&sdp)?)),
            _ => Err(RpcError::InvalidParams("exactly one of spec or sdp is required".to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferRequest {
    connection_id: ConnectionId,
    offer: String,
}

/// Entry point for client requests
pub struct RpcFacade {
    server: Arc<MediaServer>,
    sessions: Arc<SessionRegistry>,
}

impl RpcFacade {
    pub fn new(server: Arc<MediaServer>, sessions: Arc<SessionRegistry>) -> Self {
        Self { server, sessions }
    }

    pub fn server(&self) -> &Arc<MediaServer> {
        &self.server
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Register a new client session
    pub fn open_session(&self, capacity: usize) -> (ClientSession, mpsc::Receiver<RpcNotification>) {
        self.sessions.open(capacity)
    }

    /// Forget a client session and drop all of its subscriptions
    pub fn close_session(&self, session: &ClientSession) -> usize {
        self.sessions.remove(session);
        let released = self.server.release_destination(&session.destination());
        debug!("Closed session {} ({} subscriptions released)", session.token, released);
        released
    }

    /// Handle one request
    pub async fn handle(&self, session: &ClientSession, request: RpcRequest) -> RpcResponse {
        let span = info_span!("rpc", operation = %request.operation, session = %session.token);
        let operation = request.operation.clone();

        match self.dispatch(session, request).instrument(span).await {
            Ok(value) => RpcResponse::Result(value),
            Err(e) => {
                debug!("{} failed for {}: {}", operation, session.token, e);
                RpcResponse::Error(e.to_error_object())
            }
        }
    }

    async fn dispatch(&self, session: &ClientSession, request: RpcRequest) -> Result<Value> {
        let RpcRequest {
            object,
            operation,
            params,
        } = request;
        let server = &self.server;

        match operation.as_str() {
            "ping" => Ok(json!({ "pong": true })),
            "serverInfo" => Ok(json!({
                "version": env!("CARGO_PKG_VERSION"),
                "running": server.is_running(),
                "elementTypes": server.registry().type_names(),
                "pipelines": server.pipelines(),
                "stats": server.stats(),
            })),
            "create" => {
                let req: CreateRequest = parse(params)?;
                let id = server.create(&req.type_name, object, req.params).await?;
                Ok(json!({ "objectId": id }))
            }
            "describe" => to_value(server.describe(target(object)?).await?),
            "children" => Ok(json!({ "children": server.children(target(object)?).await? })),
            "destroy" => to_value(server.destroy(target(object)?).await?),
            "touch" => {
                server.touch(target(object)?).await?;
                Ok(Value::Null)
            }
            "setName" => {
                let req: NameRequest = parse(params)?;
                server.set_name(target(object)?, req.name).await?;
                Ok(Value::Null)
            }
            "setTag" => {
                let req: TagRequest = parse(params)?;
                server.set_tag(target(object)?, req.key, req.value).await?;
                Ok(Value::Null)
            }
            "removeTag" => {
                let req: TagRequest = parse(params)?;
                let previous = server.remove_tag(target(object)?, &req.key).await?;
                Ok(json!({ "previous": previous }))
            }
            "subscribe" => {
                let req: SubscribeRequest = parse(params)?;
                let id = server
                    .subscribe(target(object)?, req.event_type, session.destination())
                    .await?;
                Ok(json!({ "subscriptionId": id }))
            }
            "unsubscribe" => {
                let req: UnsubscribeRequest = parse(params)?;
                Ok(json!({ "removed": server.unsubscribe(req.subscription_id) }))
            }
            "createConnection" => {
                let req: CreateConnectionRequest = parse_or_default(params)?;
                let id = server.create_connection(target(object)?, req.role).await?;
                Ok(json!({ "connectionId": id }))
            }
            "setLocalSpec" => {
                let (connection, spec) = parse::<DescriptionRequest>(params)?.into_parts()?;
                server.set_local_spec(connection, spec).await?;
                Ok(Value::Null)
            }
            "negotiate" => {
                let (connection, remote) = parse::<DescriptionRequest>(params)?.into_parts()?;
                let outcome = server.negotiate(connection, remote).await?;
                Ok(json!({
                    "result": outcome.session.result,
                    "cached": outcome.cached,
                    "superseded": outcome.superseded,
                    "empty": outcome.session.result.is_empty(),
                }))
            }
            "processOffer" => {
                let req: OfferRequest = parse(params)?;
                self.process_offer(req).await
            }
            "closeConnection" => {
                let req: ConnectionRequest = parse(params)?;
                server.close_connection(req.connection_id).await?;
                Ok(Value::Null)
            }
            "connectionInfo" => {
                let req: ConnectionRequest = parse(params)?;
                to_value(server.connection_info(req.connection_id)?)
            }
            other => Err(RpcError::MethodNotFound(other.to_string())),
        }
    }

    /// Negotiate a remote SDP offer on an answering connection and render
    /// the answer
    async fn process_offer(&self, req: OfferRequest) -> Result<Value> {
        let info = self.server.connection_info(req.connection_id)?;
        if info.role != Role::Answerer {
            return Err(MediaError::InvalidState(format!(
                "connection {} is not an answerer",
                req.connection_id
            ))
            .into());
        }

        let offer = parse_sdp(&req.offer)?;
        let outcome = self.server.negotiate(req.connection_id, offer).await?;
        let answer = render_sdp(&outcome.session.result.answerer_view());
        Ok(json!({
            "answer": answer,
            "empty": outcome.session.result.is_empty(),
        }))
    }
}

fn target(object: Option<ObjectId>) -> Result<ObjectId> {
    object.ok_or_else(|| RpcError::InvalidParams("operation requires an object".to_string()))
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| RpcError::InvalidParams(e.to_string()))
}

fn parse_or_default<T: DeserializeOwned + Default>(params: Value) -> Result<T> {
    if params.is_null() {
        return Ok(T::default());
    }
    parse(params)
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| RpcError::Media(MediaError::Infra(rmedia_infra_common::Error::Internal(e.to_string()))))
}
