/// WebSocket transport adapter: one actix actor per connection.
///
/// The actor parses inbound frames into typed events, hands them to the
/// router, and pumps router output back into the socket through an
/// unbounded channel. The channel's sending half is the connection handle
/// the registries see; the routing side never touches the socket itself.
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tokio::sync::mpsc;

use crate::events::{InboundEvent, OutboundEvent};
use crate::registry::connections::{ConnectionHandle, SessionCommand};
use crate::router::{dispatch, Router};

pub struct WsSession {
    conn: ConnectionHandle,
    rx: Option<mpsc::UnboundedReceiver<SessionCommand>>,
    registered: Option<String>,
    router: web::Data<Router>,
}

impl WsSession {
    pub fn new(router: web::Data<Router>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        WsSession {
            conn: ConnectionHandle::new(tx),
            rx: Some(rx),
            registered: None,
            router,
        }
    }

    fn process(&mut self, event: InboundEvent, ctx: &mut ws::WebsocketContext<Self>) {
        // A connection's identity is set once at registration and is
        // immutable for its lifetime.
        if let InboundEvent::Register { username, .. } = &event {
            match &self.registered {
                Some(current) if current != username => {
                    self.send_event(
                        ctx,
                        OutboundEvent::validation_error("connection already registered"),
                    );
                    return;
                }
                _ if !username.trim().is_empty() => {
                    self.registered = Some(username.clone());
                }
                _ => {}
            }
        }

        let router = self.router.clone();
        let conn = self.conn.clone();
        // Events from one connection are handled in arrival order: the
        // mailbox stays paused until the router has finished this one.
        ctx.wait(actix::fut::wrap_future::<_, Self>(async move {
            match router.handle(&conn, event).await {
                Ok(deliveries) => dispatch(deliveries),
                Err(err) => {
                    conn.deliver(OutboundEvent::error(&err));
                }
            }
        }));
    }

    fn send_event(&self, ctx: &mut ws::WebsocketContext<Self>, event: OutboundEvent) {
        match serde_json::to_string(&event) {
            Ok(text) => ctx.text(text),
            Err(e) => log::error!("failed to serialize outbound event: {}", e),
        }
    }
}

#[derive(Message)]
#[rtype(result = "()")]
struct SessionFrame(SessionCommand);

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        log::info!("websocket session started: {}", self.conn.id());
        if let Some(mut rx) = self.rx.take() {
            let addr = ctx.address();
            tokio::spawn(async move {
                while let Some(cmd) = rx.recv().await {
                    addr.do_send(SessionFrame(cmd));
                }
            });
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        log::info!("websocket session stopped: {}", self.conn.id());
        let router = self.router.clone();
        let conn_id = self.conn.id();
        actix::spawn(async move {
            dispatch(router.connection_closed(conn_id).await);
        });
    }
}

impl Handler<SessionFrame> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: SessionFrame, ctx: &mut Self::Context) {
        match msg.0 {
            SessionCommand::Deliver(event) => self.send_event(ctx, event),
            SessionCommand::Shutdown => {
                // superseded by a newer registration
                ctx.close(None);
                ctx.stop();
            }
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<InboundEvent>(&text) {
                Ok(event) => self.process(event, ctx),
                Err(e) => {
                    log::warn!("unparseable frame from {}: {}", self.conn.id(), e);
                    self.send_event(ctx, OutboundEvent::validation_error("unrecognized event"));
                }
            },
            Ok(ws::Message::Ping(payload)) => ctx.pong(&payload),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                log::error!("websocket error on {}: {}", self.conn.id(), e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// WebSocket connection handler
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    router: web::Data<Router>,
) -> actix_web::Result<HttpResponse> {
    ws::start(WsSession::new(router), &req, stream)
}
