//! Streaming render client for `/render/ws`.
//!
//! [`RenderSession`] is the protocol state machine. It knows nothing about
//! sockets: it consumes channel events and emits [`Effect`]s. [`drive`] pumps
//! a [`RenderChannel`] through a session until it reaches a terminal state,
//! and [`WsChannel`] is the tokio-tungstenite implementation of the channel.

use crate::{
    api::Endpoints,
    plan::CompositionPlanDocument,
    types::{AudioResult, ClientMessage, ErrorCode, RenderProgress, ServerMessage},
};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{protocol::frame::coding::CloseCode, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

/// Progress stage that tells the client the server is ready for the plan.
pub const HANDSHAKE_STAGE: &str = "connected";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("{code}: {message}")]
    Server { code: ErrorCode, message: String },
    #[error("render connection failed: {0}")]
    Transport(String),
    #[error("invalid message from server: {0}")]
    InvalidMessage(String),
    #[error("render timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

impl RenderError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::TimedOut(_))
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Connecting,
    AwaitingHandshake,
    Rendering,
    Completed,
    Failed,
}

impl RenderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Text(String),
    Closed { clean: bool },
    Error(String),
}

/// Duplex message channel a render attempt runs over.
#[async_trait]
pub trait RenderChannel: Send {
    async fn send_text(&mut self, text: String) -> Result<(), RenderError>;

    /// Next inbound event. A finished channel keeps reporting `Closed`.
    async fn next_event(&mut self) -> ChannelEvent;

    async fn close(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Progress(RenderProgress),
    Send(ClientMessage),
    Complete(AudioResult),
    Fail(RenderError),
}

/// One render attempt. Never reused: a retry needs a fresh session and channel.
#[derive(Debug)]
pub struct RenderSession {
    state: RenderState,
    endpoints: Endpoints,
    document: CompositionPlanDocument,
    title: Option<String>,
    request_sent: bool,
}

impl RenderSession {
    pub fn new(
        endpoints: Endpoints,
        document: CompositionPlanDocument,
        title: Option<String>,
    ) -> Self {
        Self { state: RenderState::Connecting, endpoints, document, title, request_sent: false }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn request_sent(&self) -> bool {
        self.request_sent
    }

    pub fn opened(&mut self) {
        if self.state == RenderState::Connecting {
            self.transition(RenderState::AwaitingHandshake);
        }
    }

    pub fn handle_text(&mut self, raw: &str) -> Vec<Effect> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        self.opened();
        let message = match decode_frame(raw) {
            Ok(Some(message)) => message,
            Ok(None) => return Vec::new(),
            Err(err) => return vec![self.fail(err)],
        };

        match message {
            ServerMessage::Progress { stage, progress_percent, message, .. } => {
                let handshake = stage == HANDSHAKE_STAGE;
                let mut effects = vec![Effect::Progress(RenderProgress {
                    stage,
                    percent: progress_percent,
                    message,
                })];
                if handshake && !self.request_sent {
                    self.request_sent = true;
                    self.transition(RenderState::Rendering);
                    let payload = self.document.render_payload(self.title.clone());
                    effects.push(Effect::Send(ClientMessage::Render { composition_plan: payload }));
                }
                effects
            }
            ServerMessage::Result { data } => {
                self.transition(RenderState::Completed);
                vec![Effect::Complete(self.endpoints.audio_from_result(&data))]
            }
            ServerMessage::Error { error_code, message, .. } => {
                vec![self.fail(RenderError::Server { code: error_code, message })]
            }
        }
    }

    pub fn handle_closed(&mut self, clean: bool) -> Option<Effect> {
        if self.state.is_terminal() {
            return None;
        }
        let detail = if clean {
            "connection closed before a result arrived"
        } else {
            "connection closed unexpectedly"
        };
        Some(self.fail(RenderError::Transport(detail.to_string())))
    }

    pub fn handle_transport_error(&mut self, detail: &str) -> Option<Effect> {
        if self.state.is_terminal() {
            return None;
        }
        Some(self.fail(RenderError::Transport(detail.to_string())))
    }

    fn fail(&mut self, err: RenderError) -> Effect {
        warn!("render failed: {err}");
        self.transition(RenderState::Failed);
        Effect::Fail(err)
    }

    fn transition(&mut self, next: RenderState) {
        debug!("render session {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// `Ok(None)` for well-formed frames of a type this client does not handle.
fn decode_frame(raw: &str) -> Result<Option<ServerMessage>, RenderError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| RenderError::InvalidMessage(err.to_string()))?;
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    if !ServerMessage::KNOWN_TYPES.contains(&kind) {
        debug!("ignoring render frame of type {kind:?}");
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|err| RenderError::InvalidMessage(err.to_string()))
}

/// Runs `session` over `channel` until it completes or fails. The channel is
/// closed before returning either way.
pub async fn drive<C>(
    channel: &mut C,
    mut session: RenderSession,
    on_progress: &mut (dyn for<'p> FnMut(&'p RenderProgress) + Send),
) -> Result<AudioResult, RenderError>
where
    C: RenderChannel + ?Sized,
{
    session.opened();
    loop {
        let effects: Vec<Effect> = match channel.next_event().await {
            ChannelEvent::Text(raw) => session.handle_text(&raw),
            ChannelEvent::Closed { clean } => session.handle_closed(clean).into_iter().collect(),
            ChannelEvent::Error(detail) => {
                session.handle_transport_error(&detail).into_iter().collect()
            }
        };

        for effect in effects {
            match effect {
                Effect::Progress(progress) => on_progress(&progress),
                Effect::Send(message) => {
                    let sent = match serde_json::to_string(&message) {
                        Ok(text) => channel.send_text(text).await,
                        Err(err) => Err(RenderError::Transport(format!(
                            "failed to encode render request: {err}"
                        ))),
                    };
                    if let Err(err) = sent {
                        session.handle_transport_error(&err.to_string());
                        channel.close().await;
                        return Err(err);
                    }
                    info!("render request sent");
                }
                Effect::Complete(audio) => {
                    info!("render completed: {}", audio.filename);
                    channel.close().await;
                    return Ok(audio);
                }
                Effect::Fail(err) => {
                    channel.close().await;
                    return Err(err);
                }
            }
        }
    }
}

pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    finished: bool,
}

impl WsChannel {
    pub async fn connect(url: &str) -> Result<Self, RenderError> {
        let (stream, _) =
            connect_async(url).await.map_err(|err| RenderError::Transport(err.to_string()))?;
        debug!("render socket open: {url}");
        Ok(Self { stream, finished: false })
    }
}

#[async_trait]
impl RenderChannel for WsChannel {
    async fn send_text(&mut self, text: String) -> Result<(), RenderError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|err| RenderError::Transport(err.to_string()))
    }

    async fn next_event(&mut self) -> ChannelEvent {
        if self.finished {
            return ChannelEvent::Closed { clean: true };
        }
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return ChannelEvent::Text(text),
                Some(Ok(Message::Binary(bytes))) => {
                    return ChannelEvent::Text(String::from_utf8_lossy(&bytes).into_owned())
                }
                Some(Ok(Message::Close(frame))) => {
                    self.finished = true;
                    let clean = frame.map(|frame| frame.code == CloseCode::Normal).unwrap_or(false);
                    return ChannelEvent::Closed { clean };
                }
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    self.finished = true;
                    return ChannelEvent::Error(err.to_string());
                }
                None => {
                    self.finished = true;
                    return ChannelEvent::Closed { clean: false };
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(err) = self.stream.close(None).await {
            debug!("render socket close: {err}");
        }
        self.finished = true;
    }
}

/// Opens `/render/ws` and runs one attempt to completion.
pub async fn render_over_websocket(
    endpoints: &Endpoints,
    document: CompositionPlanDocument,
    title: Option<String>,
    on_progress: &mut (dyn for<'p> FnMut(&'p RenderProgress) + Send),
) -> Result<AudioResult, RenderError> {
    let url = endpoints.render_socket().map_err(|err| RenderError::Transport(err.to_string()))?;
    let session = RenderSession::new(endpoints.clone(), document, title);
    info!("connecting to {url}");
    let mut channel = WsChannel::connect(url.as_str()).await?;
    drive(&mut channel, session, on_progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::normalize;
    use serde_json::json;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedChannel {
        script: VecDeque<ChannelEvent>,
        consumed: usize,
        sent: Vec<(usize, String)>,
        closed: bool,
        fail_sends: bool,
    }

    impl ScriptedChannel {
        fn new(frames: Vec<ChannelEvent>) -> Self {
            Self { script: frames.into(), ..Self::default() }
        }
    }

    #[async_trait]
    impl RenderChannel for ScriptedChannel {
        async fn send_text(&mut self, text: String) -> Result<(), RenderError> {
            if self.fail_sends {
                return Err(RenderError::Transport("broken pipe".into()));
            }
            self.sent.push((self.consumed, text));
            Ok(())
        }

        async fn next_event(&mut self) -> ChannelEvent {
            self.consumed += 1;
            self.script.pop_front().unwrap_or(ChannelEvent::Closed { clean: false })
        }

        async fn close(&mut self) {
            self.closed = true;
        }
    }

    fn text(value: Value) -> ChannelEvent {
        ChannelEvent::Text(value.to_string())
    }

    fn progress(stage: &str, percent: f32) -> ChannelEvent {
        text(json!({
            "type": "progress",
            "stage": stage,
            "progress_percent": percent,
            "message": format!("{stage}..."),
            "timestamp": "2025-01-01T00:00:00Z"
        }))
    }

    fn result_frame() -> ChannelEvent {
        text(json!({
            "type": "result",
            "data": {
                "filename": "track_1.mp3",
                "download_url": "/render/download/track_1.mp3",
                "stream_url": "/render/stream/track_1.mp3",
                "content_type": "audio/mpeg",
                "file_size_bytes": 2048
            }
        }))
    }

    fn session() -> RenderSession {
        let document = normalize(json!({
            "positive_global_styles": ["pop"],
            "sections": [{"section_name": "Intro", "duration_ms": 3000}]
        }))
        .unwrap();
        RenderSession::new(Endpoints::new(None).unwrap(), document, Some("Sam's Day".into()))
    }

    #[tokio::test]
    async fn sends_plan_once_after_handshake_and_resolves() {
        let mut channel = ScriptedChannel::new(vec![
            progress("queued", 0.0),
            progress(HANDSHAKE_STAGE, 0.0),
            progress(HANDSHAKE_STAGE, 5.0),
            progress("rendering", 60.0),
            result_frame(),
        ]);
        let mut seen = Vec::new();
        let outcome = drive(&mut channel, session(), &mut |progress: &RenderProgress| {
            seen.push((progress.stage.clone(), progress.percent))
        })
        .await
        .unwrap();

        assert_eq!(channel.sent.len(), 1);
        let (consumed_at_send, frame) = &channel.sent[0];
        assert_eq!(*consumed_at_send, 2);
        let frame: Value = serde_json::from_str(frame).unwrap();
        assert_eq!(frame["type"], json!("render"));
        assert_eq!(frame["composition_plan"]["title"], json!("Sam's Day"));
        assert_eq!(frame["composition_plan"]["positive_global_styles"], json!(["pop"]));
        assert_eq!(frame["composition_plan"]["sections"][0]["section_name"], json!("Intro"));

        assert_eq!(seen.len(), 4);
        assert_eq!(seen[3], ("rendering".to_string(), 60.0));
        assert_eq!(outcome.filename, "track_1.mp3");
        assert_eq!(outcome.audio_url, "http://localhost:8000/render/stream/track_1.mp3");
        assert_eq!(outcome.file_size_bytes, 2048);
        assert!(channel.closed);
    }

    #[tokio::test]
    async fn server_error_rejects_with_code_and_message() {
        let mut channel = ScriptedChannel::new(vec![
            progress(HANDSHAKE_STAGE, 0.0),
            text(json!({
                "type": "error",
                "error_code": "VALIDATION_ERROR",
                "message": "bad plan",
                "timestamp": "2025-01-01T00:00:00Z"
            })),
        ]);
        let err = drive(&mut channel, session(), &mut |_: &RenderProgress| {}).await.unwrap_err();
        assert_eq!(
            err,
            RenderError::Server { code: ErrorCode::ValidationError, message: "bad plan".into() }
        );
        assert_eq!(err.code(), Some(ErrorCode::ValidationError));
        assert!(channel.closed);
    }

    #[tokio::test]
    async fn unclean_close_before_result_is_a_transport_failure() {
        let mut channel = ScriptedChannel::new(vec![
            progress(HANDSHAKE_STAGE, 0.0),
            progress("rendering", 30.0),
            ChannelEvent::Closed { clean: false },
        ]);
        let err = drive(&mut channel, session(), &mut |_: &RenderProgress| {}).await.unwrap_err();
        assert!(err.is_transport());
        assert!(channel.closed);
    }

    #[tokio::test]
    async fn clean_close_without_result_still_fails() {
        let mut channel = ScriptedChannel::new(vec![ChannelEvent::Closed { clean: true }]);
        let err = drive(&mut channel, session(), &mut |_: &RenderProgress| {}).await.unwrap_err();
        assert!(matches!(err, RenderError::Transport(_)));
        assert!(channel.sent.is_empty());
    }

    #[tokio::test]
    async fn transport_error_event_fails_the_attempt() {
        let mut channel =
            ScriptedChannel::new(vec![ChannelEvent::Error("connection reset".into())]);
        let err = drive(&mut channel, session(), &mut |_: &RenderProgress| {}).await.unwrap_err();
        assert_eq!(err, RenderError::Transport("connection reset".into()));
    }

    #[tokio::test]
    async fn failed_send_fails_the_attempt() {
        let mut channel = ScriptedChannel::new(vec![progress(HANDSHAKE_STAGE, 0.0), result_frame()]);
        channel.fail_sends = true;
        let err = drive(&mut channel, session(), &mut |_: &RenderProgress| {}).await.unwrap_err();
        assert!(err.is_transport());
        assert!(channel.closed);
    }

    #[tokio::test]
    async fn malformed_frame_is_rejected_and_unknown_types_ignored() {
        let mut channel = ScriptedChannel::new(vec![
            text(json!({"type": "heartbeat"})),
            ChannelEvent::Text("not json".into()),
        ]);
        let err = drive(&mut channel, session(), &mut |_: &RenderProgress| {}).await.unwrap_err();
        assert!(matches!(err, RenderError::InvalidMessage(_)));
    }

    #[test]
    fn session_walks_through_states() {
        let mut session = session();
        assert_eq!(session.state(), RenderState::Connecting);
        session.opened();
        assert_eq!(session.state(), RenderState::AwaitingHandshake);

        let effects = session.handle_text(&json!({
            "type": "progress", "stage": "warming", "progress_percent": 1, "message": "warming"
        }).to_string());
        assert_eq!(effects.len(), 1);
        assert!(!session.request_sent());
        assert_eq!(session.state(), RenderState::AwaitingHandshake);

        let effects = session.handle_text(&json!({
            "type": "progress", "stage": "connected", "progress_percent": 0, "message": "ok"
        }).to_string());
        assert!(matches!(effects.as_slice(), [Effect::Progress(_), Effect::Send(_)]));
        assert_eq!(session.state(), RenderState::Rendering);

        let ChannelEvent::Text(raw) = result_frame() else { unreachable!() };
        let effects = session.handle_text(&raw);
        assert!(matches!(effects.as_slice(), [Effect::Complete(_)]));
        assert_eq!(session.state(), RenderState::Completed);

        assert!(session.handle_closed(false).is_none());
        assert!(session.handle_text(&raw).is_empty());
        assert_eq!(session.state(), RenderState::Completed);
    }
}
