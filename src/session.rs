use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use log::{debug, warn};

use crate::{
    config::Config,
    connection::Connection,
    id_type,
    loader::{DocumentView, LoadError, LoadOutcome, LoadReply, ScriptCmd, ScriptLoader},
    media::{ComponentId, MediaAsset},
    messages::{dto, Message, MessageBody},
    playback::{MediaCmd, PlaybackController, VisibilityEntry},
};

id_type!(SessionId);

pub struct Session {
    id: SessionId,
    config: Arc<Config>,
    connection: Connection,
    document: DocumentView,
    loader: ScriptLoader,
    players: HashMap<ComponentId, PlaybackController>,
}

impl Session {
    pub fn new(connection: Connection, config: Arc<Config>) -> Self {
        Self {
            id: SessionId::new(),
            loader: ScriptLoader::new(&config.embed),
            config,
            connection,
            document: DocumentView::default(),
            players: HashMap::new(),
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        debug!(
            "Session {} started for surface \"{}\"",
            self.id,
            self.connection.surface_name()
        );
        while let Some(message) = self.connection.recv().await {
            self.handle_message(message.body).await?;
        }
        debug!("Session {} ended", self.id);
        Ok(())
    }

    async fn handle_message(&mut self, body: MessageBody) -> anyhow::Result<()> {
        match body {
            MessageBody::DocumentStateV1(state) => {
                self.document = DocumentView {
                    maps_ready: state.maps_ready,
                    loader_script_present: state.loader_script_present,
                };
                Ok(())
            }
            MessageBody::ComponentMountV1(body) => self.mount_component(body).await,
            MessageBody::ComponentUnmountV1(body) => {
                self.unmount_component(body.component.into()).await
            }
            MessageBody::ScriptRequestV1(body) => self.request_script(body.component.into()).await,
            MessageBody::ScriptElementLoadedV1 => self.settle_script(Ok(())).await,
            MessageBody::ScriptElementErrorV1(body) => {
                self.settle_script(Err(LoadError::Load(body.message))).await
            }
            MessageBody::VisibilityUpdateV1(body) => {
                let entries: Vec<VisibilityEntry> =
                    body.entries.into_iter().map(Into::into).collect();
                self.control(body.component.into(), |player| player.on_visibility(&entries))
                    .await
            }
            MessageBody::MediaEventV1(body) => {
                if let Some(player) = self.player_mut(body.component.into()) {
                    player.on_media_event(body.event.into());
                }
                Ok(())
            }
            MessageBody::MediaPlaySettledV1(body) => {
                self.control(body.component.into(), |player| {
                    player.on_play_settled(body.attempt, body.result.into())
                })
                .await
            }
            MessageBody::MediaPosterErrorV1(body) => {
                self.control(body.component.into(), PlaybackController::on_poster_error)
                    .await
            }
            MessageBody::ControlPlayV1(body) => {
                self.control(body.component.into(), PlaybackController::play)
                    .await
            }
            MessageBody::ControlPauseV1(body) => {
                self.control(body.component.into(), PlaybackController::pause)
                    .await
            }
            MessageBody::ControlStopV1(body) => {
                self.control(body.component.into(), PlaybackController::stop)
                    .await
            }
            MessageBody::ControlToggleMuteV1(body) => {
                self.control(body.component.into(), PlaybackController::toggle_mute)
                    .await
            }
            MessageBody::SurfaceClientErrorV1(body) => {
                warn!(
                    "Surface \"{}\" reported an error: {}",
                    self.connection.surface_name(),
                    body.message
                );
                Ok(())
            }
            body => {
                debug!("Session {} received an unexpected message: {body:?}", self.id);
                self.connection
                    .send_error("Unexpected message for an attached surface")
                    .await;
                Ok(())
            }
        }
    }

    async fn mount_component(&mut self, body: dto::ComponentMountMsgBodyV1) -> anyhow::Result<()> {
        let component = ComponentId::from(body.component);
        if self.players.contains_key(&component) {
            self.connection
                .send_error(format!("Component {component} is already mounted"))
                .await;
            return Ok(());
        }
        let assets: Vec<MediaAsset> = body.assets.into_iter().map(MediaAsset::from).collect();
        let (player, commands) = PlaybackController::mount(component, &assets, &self.config.embed);
        self.players.insert(component, player);
        self.forward_media_cmds(component, commands).await
    }

    async fn unmount_component(&mut self, component: ComponentId) -> anyhow::Result<()> {
        let Some(player) = self.players.remove(&component) else {
            debug!("Ignoring unmount for unknown component {component}");
            return Ok(());
        };
        let commands = player.unmount();
        self.forward_media_cmds(component, commands).await
    }

    async fn request_script(&mut self, component: ComponentId) -> anyhow::Result<()> {
        if !self.connection.permissions().script {
            warn!(
                "Surface \"{}\" requested the maps script without the script permission",
                self.connection.surface_name()
            );
            return self
                .connection
                .send(Message::new(MessageBody::ScriptErrorV1(
                    dto::ScriptErrorMsgBodyV1 {
                        component: *component,
                        reason: dto::ScriptErrorReasonV1::NotPermitted,
                    },
                )))
                .await;
        }
        match self.loader.request(component, &self.document) {
            LoadReply::Settled(outcome) => self.send_script_outcome(component, &outcome).await,
            LoadReply::Pending { cmd: None } => Ok(()),
            LoadReply::Pending { cmd: Some(cmd) } => self.send_script_cmd(cmd).await,
        }
    }

    async fn settle_script(&mut self, outcome: LoadOutcome) -> anyhow::Result<()> {
        for (component, outcome) in self.loader.settle(outcome) {
            self.send_script_outcome(component, &outcome).await?;
        }
        Ok(())
    }

    async fn send_script_cmd(&mut self, cmd: ScriptCmd) -> anyhow::Result<()> {
        let body = match cmd {
            ScriptCmd::Insert(tag) => MessageBody::ScriptInsertV1(dto::ScriptInsertMsgBodyV1 {
                id: tag.id.to_string(),
                src: tag.src,
                load_async: tag.load_async,
                defer: tag.defer,
            }),
            ScriptCmd::Watch { id } => MessageBody::ScriptWatchV1(dto::ScriptWatchMsgBodyV1 {
                id: id.to_string(),
            }),
        };
        self.connection
            .send(Message::new(body))
            .await
            .context("Failed to forward a script command")
    }

    async fn send_script_outcome(
        &mut self,
        component: ComponentId,
        outcome: &LoadOutcome,
    ) -> anyhow::Result<()> {
        let body = match outcome {
            Ok(()) => MessageBody::ScriptReadyV1(dto::ComponentMsgBodyV1 {
                component: *component,
            }),
            Err(err) => MessageBody::ScriptErrorV1(dto::ScriptErrorMsgBodyV1 {
                component: *component,
                reason: err.into(),
            }),
        };
        self.connection
            .send(Message::new(body))
            .await
            .context("Failed to report a script outcome")
    }

    fn player_mut(&mut self, component: ComponentId) -> Option<&mut PlaybackController> {
        let player = self.players.get_mut(&component);
        if player.is_none() {
            debug!("Dropping an event for unknown component {component}");
        }
        player
    }

    async fn control(
        &mut self,
        component: ComponentId,
        action: impl FnOnce(&mut PlaybackController) -> Vec<MediaCmd>,
    ) -> anyhow::Result<()> {
        let Some(player) = self.player_mut(component) else {
            return Ok(());
        };
        let commands = action(player);
        self.forward_media_cmds(component, commands).await
    }

    async fn forward_media_cmds(
        &mut self,
        component: ComponentId,
        commands: Vec<MediaCmd>,
    ) -> anyhow::Result<()> {
        for cmd in commands {
            let body = match cmd {
                MediaCmd::Observe {
                    root_margin,
                    thresholds,
                } => MessageBody::MediaObserveV1(dto::MediaObserveMsgBodyV1 {
                    component: *component,
                    root_margin: root_margin.to_string(),
                    thresholds,
                }),
                MediaCmd::Unobserve => MessageBody::MediaUnobserveV1(dto::ComponentMsgBodyV1 {
                    component: *component,
                }),
                MediaCmd::SetMuted(muted) => {
                    MessageBody::MediaSetMutedV1(dto::MediaSetMutedMsgBodyV1 {
                        component: *component,
                        muted,
                    })
                }
                MediaCmd::Play { attempt } => MessageBody::MediaPlayV1(dto::MediaPlayMsgBodyV1 {
                    component: *component,
                    attempt,
                }),
                MediaCmd::Pause => MessageBody::MediaPauseV1(dto::ComponentMsgBodyV1 {
                    component: *component,
                }),
                MediaCmd::SeekToStart => MessageBody::MediaSeekStartV1(dto::ComponentMsgBodyV1 {
                    component: *component,
                }),
                MediaCmd::SetPoster { src } => {
                    MessageBody::MediaSetPosterV1(dto::MediaSetPosterMsgBodyV1 {
                        component: *component,
                        src,
                    })
                }
            };
            self.connection
                .send(Message::new(body))
                .await
                .context("Failed to forward a media command")?;
        }
        Ok(())
    }
}
