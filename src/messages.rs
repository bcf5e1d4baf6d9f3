use std::error::Error;

use anyhow::{anyhow, Context as _};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite;

use crate::utils::timestamp;

pub mod dto {
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SurfaceAttachMsgBodyV1 {
        pub name: String,
        pub api_key: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub enum SurfaceClosedReasonV1 {
        #[serde(rename = "unauthorized")]
        Unauthorized,

        #[serde(rename = "server_error")]
        ServerError,

        #[serde(rename = "timeout")]
        Timeout,

        #[serde(rename = "unknown")]
        Unknown,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SurfaceClosedMsgBodyV1 {
        pub reason: SurfaceClosedReasonV1,
        pub message: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SurfaceClientErrorMsgBodyV1 {
        pub message: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DocumentStateMsgBodyV1 {
        pub maps_ready: bool,
        pub loader_script_present: bool,
    }

    // Shared body for every message that only references a component.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ComponentMsgBodyV1 {
        pub component: Uuid,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub enum MediaKindV1 {
        #[serde(rename = "image")]
        Image,

        #[serde(rename = "audio")]
        Audio,

        #[serde(rename = "video")]
        Video,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct MediaAssetV1 {
        pub id: Uuid,
        pub kind: MediaKindV1,
        pub url: String,
        pub mime: Option<String>,
        pub duration_sec: Option<f32>,
        pub width: Option<u32>,
        pub height: Option<u32>,
        pub metadata: Option<serde_json::Value>,
        pub created_at: Option<u64>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ComponentMountMsgBodyV1 {
        pub component: Uuid,
        pub assets: Vec<MediaAssetV1>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ScriptElementErrorMsgBodyV1 {
        pub message: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ScriptInsertMsgBodyV1 {
        pub id: String,
        pub src: String,

        #[serde(rename = "async")]
        pub load_async: bool,

        pub defer: bool,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ScriptWatchMsgBodyV1 {
        pub id: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub enum ScriptErrorReasonV1 {
        #[serde(rename = "configuration_missing")]
        ConfigurationMissing,

        #[serde(rename = "load_failed")]
        LoadFailed,

        #[serde(rename = "not_permitted")]
        NotPermitted,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ScriptErrorMsgBodyV1 {
        pub component: Uuid,
        pub reason: ScriptErrorReasonV1,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct VisibilityEntryV1 {
        pub ratio: f32,
        pub intersecting: bool,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct VisibilityUpdateMsgBodyV1 {
        pub component: Uuid,
        pub entries: Vec<VisibilityEntryV1>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub enum MediaEventKindV1 {
        #[serde(rename = "playing")]
        Playing,

        #[serde(rename = "paused")]
        Paused,

        #[serde(rename = "ended")]
        Ended,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MediaEventMsgBodyV1 {
        pub component: Uuid,
        pub event: MediaEventKindV1,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "kind")]
    pub enum PlayResultV1 {
        #[serde(rename = "started")]
        Started,

        #[serde(rename = "denied")]
        Denied,

        #[serde(rename = "failed")]
        Failed { message: String },
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MediaPlaySettledMsgBodyV1 {
        pub component: Uuid,
        pub attempt: u64,
        pub result: PlayResultV1,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct MediaObserveMsgBodyV1 {
        pub component: Uuid,
        pub root_margin: String,
        pub thresholds: Vec<f32>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MediaSetMutedMsgBodyV1 {
        pub component: Uuid,
        pub muted: bool,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MediaPlayMsgBodyV1 {
        pub component: Uuid,
        pub attempt: u64,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MediaSetPosterMsgBodyV1 {
        pub component: Uuid,
        pub src: String,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "m")]
#[non_exhaustive]
pub enum MessageBody {
    #[serde(rename = "surface::attach/v1")]
    SurfaceAttachV1(dto::SurfaceAttachMsgBodyV1),

    #[serde(rename = "surface::attach_ack/v1")]
    SurfaceAttachAckV1,

    #[serde(rename = "surface::ping/v1")]
    SurfacePingV1,

    #[serde(rename = "surface::pong/v1")]
    SurfacePongV1,

    #[serde(rename = "surface::keepalive/v1")]
    SurfaceKeepaliveV1,

    #[serde(rename = "surface::client_error/v1")]
    SurfaceClientErrorV1(dto::SurfaceClientErrorMsgBodyV1),

    #[serde(rename = "surface::closed/v1")]
    SurfaceClosedV1(dto::SurfaceClosedMsgBodyV1),

    #[serde(rename = "document::state/v1")]
    DocumentStateV1(dto::DocumentStateMsgBodyV1),

    #[serde(rename = "component::mount/v1")]
    ComponentMountV1(dto::ComponentMountMsgBodyV1),

    #[serde(rename = "component::unmount/v1")]
    ComponentUnmountV1(dto::ComponentMsgBodyV1),

    #[serde(rename = "script::request/v1")]
    ScriptRequestV1(dto::ComponentMsgBodyV1),

    #[serde(rename = "script::element_loaded/v1")]
    ScriptElementLoadedV1,

    #[serde(rename = "script::element_error/v1")]
    ScriptElementErrorV1(dto::ScriptElementErrorMsgBodyV1),

    #[serde(rename = "script::insert/v1")]
    ScriptInsertV1(dto::ScriptInsertMsgBodyV1),

    #[serde(rename = "script::watch/v1")]
    ScriptWatchV1(dto::ScriptWatchMsgBodyV1),

    #[serde(rename = "script::ready/v1")]
    ScriptReadyV1(dto::ComponentMsgBodyV1),

    #[serde(rename = "script::error/v1")]
    ScriptErrorV1(dto::ScriptErrorMsgBodyV1),

    #[serde(rename = "visibility::update/v1")]
    VisibilityUpdateV1(dto::VisibilityUpdateMsgBodyV1),

    #[serde(rename = "media::event/v1")]
    MediaEventV1(dto::MediaEventMsgBodyV1),

    #[serde(rename = "media::play_settled/v1")]
    MediaPlaySettledV1(dto::MediaPlaySettledMsgBodyV1),

    #[serde(rename = "media::poster_error/v1")]
    MediaPosterErrorV1(dto::ComponentMsgBodyV1),

    #[serde(rename = "media::observe/v1")]
    MediaObserveV1(dto::MediaObserveMsgBodyV1),

    #[serde(rename = "media::unobserve/v1")]
    MediaUnobserveV1(dto::ComponentMsgBodyV1),

    #[serde(rename = "media::set_muted/v1")]
    MediaSetMutedV1(dto::MediaSetMutedMsgBodyV1),

    #[serde(rename = "media::play/v1")]
    MediaPlayV1(dto::MediaPlayMsgBodyV1),

    #[serde(rename = "media::pause/v1")]
    MediaPauseV1(dto::ComponentMsgBodyV1),

    #[serde(rename = "media::seek_start/v1")]
    MediaSeekStartV1(dto::ComponentMsgBodyV1),

    #[serde(rename = "media::set_poster/v1")]
    MediaSetPosterV1(dto::MediaSetPosterMsgBodyV1),

    #[serde(rename = "control::play/v1")]
    ControlPlayV1(dto::ComponentMsgBodyV1),

    #[serde(rename = "control::pause/v1")]
    ControlPauseV1(dto::ComponentMsgBodyV1),

    #[serde(rename = "control::stop/v1")]
    ControlStopV1(dto::ComponentMsgBodyV1),

    #[serde(rename = "control::toggle_mute/v1")]
    ControlToggleMuteV1(dto::ComponentMsgBodyV1),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "t")]
    pub timestamp: u64,

    #[serde(flatten)]
    pub body: MessageBody,
}

impl Message {
    pub fn new(body: MessageBody) -> Self {
        Self::new_with_timestamp(body, timestamp())
    }

    pub fn new_with_timestamp(body: MessageBody, timestamp: u64) -> Self {
        Self { body, timestamp }
    }
}

#[derive(Debug, Clone, Default, Copy, PartialEq, Eq)]
enum MessageFormat {
    Json,

    #[default]
    Msgpack,
}

pub struct MessageChannel<S> {
    format: MessageFormat,
    ws: S,
}

impl<S> MessageChannel<S> {
    pub fn new(ws: S) -> Self {
        Self {
            format: MessageFormat::default(),
            ws,
        }
    }
}

impl<S> MessageChannel<S>
where
    S: Sink<tungstenite::Message> + Unpin,
    S::Error: Error + Send + Sync + 'static,
{
    pub async fn send(&mut self, message: Message) -> Result<(), anyhow::Error> {
        log::debug!("Sending message {message:?}");
        let serialized_msg = match self.format {
            MessageFormat::Msgpack => tungstenite::Message::Binary(
                rmp_serde::to_vec(&message).context("Failed to serialize message as MsgPack")?,
            ),
            MessageFormat::Json => tungstenite::Message::Text(
                serde_json::to_string(&message).context("Failed to serialize message as JSON")?,
            ),
        };
        self.ws
            .send(serialized_msg)
            .await
            .map_err(anyhow::Error::from)
    }

    pub async fn close(&mut self) -> Result<(), anyhow::Error> {
        self.ws.close().await?;
        Ok(())
    }
}

impl<S> MessageChannel<S>
where
    S: Stream<Item = tungstenite::Result<tungstenite::Message>> + Unpin,
{
    pub async fn recv(&mut self) -> Option<Result<Message, anyhow::Error>> {
        let msg = match self.ws.next().await? {
            Ok(msg) => msg,
            Err(err) => return Some(Err(anyhow!(err))),
        };
        let deserialized_msg: anyhow::Result<Message> = match msg {
            tungstenite::Message::Binary(data) => {
                self.format = MessageFormat::Msgpack;
                rmp_serde::from_slice(&data).map_err(|err| {
                    anyhow!(err).context("Failed to deserialize binary message as MsgPack")
                })
            }
            tungstenite::Message::Text(data) => {
                self.format = MessageFormat::Json;
                serde_json::from_str(&data).map_err(|err| {
                    anyhow!(err).context("Failed to deserialize text message as JSON")
                })
            }
            tungstenite::Message::Close(frame) => {
                log::debug!("Received close frame: {frame:?}");
                return None;
            }
            _ => return Some(Err(anyhow!("Only binary and text messages are accepted."))),
        };
        log::debug!("Received message {deserialized_msg:?}");
        Some(deserialized_msg)
    }
}
