use log::{debug, warn};

use crate::{
    config::EmbedConfig,
    media::{first_of_kind, ComponentId, MediaAsset, MediaKind},
    messages::dto,
};

const OBSERVE_ROOT_MARGIN: &str = "0px";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Observing,
    PlayingUnmuted,
    PlayingMuted,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityEntry {
    pub ratio: f32,
    pub intersecting: bool,
}

impl From<dto::VisibilityEntryV1> for VisibilityEntry {
    fn from(value: dto::VisibilityEntryV1) -> Self {
        Self {
            ratio: value.ratio,
            intersecting: value.intersecting,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    Playing,
    Paused,
    Ended,
}

impl From<dto::MediaEventKindV1> for MediaEvent {
    fn from(value: dto::MediaEventKindV1) -> Self {
        match value {
            dto::MediaEventKindV1::Playing => Self::Playing,
            dto::MediaEventKindV1::Paused => Self::Paused,
            dto::MediaEventKindV1::Ended => Self::Ended,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayResult {
    Started,
    Denied,
    Failed(String),
}

impl From<dto::PlayResultV1> for PlayResult {
    fn from(value: dto::PlayResultV1) -> Self {
        match value {
            dto::PlayResultV1::Started => Self::Started,
            dto::PlayResultV1::Denied => Self::Denied,
            dto::PlayResultV1::Failed { message } => Self::Failed(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaCmd {
    Observe {
        root_margin: &'static str,
        thresholds: Vec<f32>,
    },
    Unobserve,
    SetMuted(bool),
    Play {
        attempt: u64,
    },
    Pause,
    SeekToStart,
    SetPoster {
        src: String,
    },
}

#[derive(Debug, Clone, Copy)]
struct PendingAttempt {
    id: u64,
    retry_used: bool,
}

#[derive(Debug)]
pub struct PlaybackController {
    component: ComponentId,
    state: PlayerState,
    muted: bool,
    pending: Option<PendingAttempt>,
    next_attempt: u64,
    activation_threshold: f32,
    poster_src: Option<String>,
    poster_fallback: String,
}

impl PlaybackController {
    pub fn mount(
        component: ComponentId,
        assets: &[MediaAsset],
        config: &EmbedConfig,
    ) -> (Self, Vec<MediaCmd>) {
        let mut controller = Self {
            component,
            state: PlayerState::Idle,
            muted: false,
            pending: None,
            next_attempt: 1,
            activation_threshold: config.activation_threshold,
            poster_src: first_of_kind(assets, MediaKind::Image).map(|asset| asset.url.clone()),
            poster_fallback: config.poster_fallback_url.clone(),
        };

        let Some(video) = first_of_kind(assets, MediaKind::Video) else {
            debug!("Component {component} has no video asset, nothing to control");
            return (controller, Vec::new());
        };

        debug!("Component {component} mounted video {}, observing visibility", video.id);
        controller.state = PlayerState::Observing;
        let commands = vec![MediaCmd::Observe {
            root_margin: OBSERVE_ROOT_MARGIN,
            thresholds: vec![0.0, config.activation_threshold, 1.0],
        }];
        (controller, commands)
    }

    pub fn unmount(self) -> Vec<MediaCmd> {
        debug!("Component {} unmounted, releasing its element", self.component);
        vec![MediaCmd::Unobserve]
    }

    pub fn on_visibility(&mut self, entries: &[VisibilityEntry]) -> Vec<MediaCmd> {
        if self.state == PlayerState::Idle {
            return Vec::new();
        }
        let Some(latest) = entries.last() else {
            return Vec::new();
        };
        let ratio = entries.iter().map(|entry| entry.ratio).sum::<f32>() / entries.len() as f32;

        if latest.intersecting && ratio >= self.activation_threshold {
            debug!(
                "Component {} is visible (ratio {ratio:.2}), attempting playback",
                self.component
            );
            self.start_attempt(false)
        } else {
            self.pending = None;
            vec![MediaCmd::Pause]
        }
    }

    pub fn on_play_settled(&mut self, attempt: u64, result: PlayResult) -> Vec<MediaCmd> {
        let pending = match self.pending {
            Some(pending) if pending.id == attempt => pending,
            _ => {
                debug!("Dropping a stale play settlement for component {}", self.component);
                return Vec::new();
            }
        };
        self.pending = None;

        match result {
            PlayResult::Started => Vec::new(),
            PlayResult::Denied => {
                if !pending.retry_used && !self.muted {
                    debug!("Autoplay denied for component {}, retrying muted", self.component);
                    self.muted = true;
                    self.start_attempt(true)
                } else {
                    debug!(
                        "Autoplay denied for component {}, waiting for the next visibility change",
                        self.component
                    );
                    Vec::new()
                }
            }
            PlayResult::Failed(message) => {
                warn!("Play attempt for component {} failed: {message}", self.component);
                Vec::new()
            }
        }
    }

    // The element notifications are the only place playing/paused state is written,
    // so the state survives native controls and external pauses.
    pub fn on_media_event(&mut self, event: MediaEvent) {
        let next = match (self.state, event) {
            (PlayerState::Idle, _) => return,
            (_, MediaEvent::Playing) if self.muted => PlayerState::PlayingMuted,
            (_, MediaEvent::Playing) => PlayerState::PlayingUnmuted,
            (
                PlayerState::PlayingMuted | PlayerState::PlayingUnmuted,
                MediaEvent::Paused | MediaEvent::Ended,
            ) => PlayerState::Paused,
            (state, _) => state,
        };
        if next != self.state {
            debug!("Component {} moved to {next:?}", self.component);
            self.state = next;
        }
    }

    pub fn play(&mut self) -> Vec<MediaCmd> {
        if self.state == PlayerState::Idle {
            return Vec::new();
        }
        // User-requested attempts don't auto-mute on denial.
        self.start_attempt(true)
    }

    pub fn pause(&mut self) -> Vec<MediaCmd> {
        if self.state == PlayerState::Idle {
            return Vec::new();
        }
        self.pending = None;
        vec![MediaCmd::Pause]
    }

    pub fn stop(&mut self) -> Vec<MediaCmd> {
        if self.state == PlayerState::Idle {
            return Vec::new();
        }
        self.pending = None;
        vec![MediaCmd::Pause, MediaCmd::SeekToStart]
    }

    pub fn toggle_mute(&mut self) -> Vec<MediaCmd> {
        if self.state == PlayerState::Idle {
            return Vec::new();
        }
        self.muted = !self.muted;
        self.state = match self.state {
            PlayerState::PlayingUnmuted if self.muted => PlayerState::PlayingMuted,
            PlayerState::PlayingMuted if !self.muted => PlayerState::PlayingUnmuted,
            state => state,
        };
        vec![MediaCmd::SetMuted(self.muted)]
    }

    pub fn on_poster_error(&mut self) -> Vec<MediaCmd> {
        if self.poster_src.as_deref() == Some(self.poster_fallback.as_str()) {
            debug!(
                "Fallback poster for component {} failed as well, leaving it in place",
                self.component
            );
            return Vec::new();
        }
        self.poster_src = Some(self.poster_fallback.clone());
        vec![MediaCmd::SetPoster {
            src: self.poster_fallback.clone(),
        }]
    }

    fn start_attempt(&mut self, retry_used: bool) -> Vec<MediaCmd> {
        let attempt = self.next_attempt;
        self.next_attempt += 1;
        self.pending = Some(PendingAttempt {
            id: attempt,
            retry_used,
        });
        vec![
            MediaCmd::SetMuted(self.muted),
            MediaCmd::Play { attempt },
        ]
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn embed_config() -> EmbedConfig {
        EmbedConfig {
            maps_api_key: None,
            activation_threshold: 0.6,
            poster_fallback_url: "https://cdn.example.com/poster-fallback.jpg".to_string(),
        }
    }

    fn asset(kind: MediaKind, url: &str) -> MediaAsset {
        MediaAsset {
            id: Uuid::new_v4(),
            kind,
            url: url.to_string(),
            mime: None,
            duration_sec: None,
            width: None,
            height: None,
            metadata: None,
            created_at: None,
        }
    }

    fn mounted() -> PlaybackController {
        let assets = vec![
            asset(MediaKind::Image, "https://cdn.example.com/poster.jpg"),
            asset(MediaKind::Video, "https://cdn.example.com/clip.mp4"),
        ];
        let (controller, _) = PlaybackController::mount(ComponentId::new(), &assets, &embed_config());
        controller
    }

    fn entry(ratio: f32, intersecting: bool) -> VisibilityEntry {
        VisibilityEntry { ratio, intersecting }
    }

    #[test]
    fn should_observe_visibility_when_mounted_with_a_video() {
        // given
        let assets = vec![
            asset(MediaKind::Image, "https://cdn.example.com/poster.jpg"),
            asset(MediaKind::Video, "https://cdn.example.com/clip.mp4"),
        ];

        // when
        let (controller, commands) =
            PlaybackController::mount(ComponentId::new(), &assets, &embed_config());

        // then
        assert_eq!(controller.state, PlayerState::Observing);
        assert_eq!(
            commands,
            vec![MediaCmd::Observe {
                root_margin: "0px",
                thresholds: vec![0.0, 0.6, 1.0],
            }]
        );
    }

    #[test]
    fn should_stay_idle_without_a_video_asset() {
        // given
        let assets = vec![asset(MediaKind::Image, "https://cdn.example.com/poster.jpg")];

        // when
        let (mut controller, commands) =
            PlaybackController::mount(ComponentId::new(), &assets, &embed_config());

        // then
        assert_eq!(controller.state, PlayerState::Idle);
        assert!(commands.is_empty());
        assert!(controller.on_visibility(&[entry(1.0, true)]).is_empty());
        assert!(controller.play().is_empty());
        assert!(controller.pause().is_empty());
        assert!(controller.stop().is_empty());
        assert!(controller.toggle_mute().is_empty());
    }

    #[test]
    fn should_attempt_playback_at_the_activation_threshold() {
        // given
        let mut below = mounted();
        let mut at = mounted();

        // when
        let below_commands = below.on_visibility(&[entry(0.59, true)]);
        let at_commands = at.on_visibility(&[entry(0.6, true)]);

        // then
        assert_eq!(below_commands, vec![MediaCmd::Pause]);
        assert_eq!(
            at_commands,
            vec![MediaCmd::SetMuted(false), MediaCmd::Play { attempt: 1 }]
        );
    }

    #[test]
    fn should_average_batched_visibility_entries() {
        // given
        let mut qualifying = mounted();
        let mut short = mounted();

        // when
        let qualifying_commands =
            qualifying.on_visibility(&[entry(0.4, false), entry(0.8, true)]);
        let short_commands = short.on_visibility(&[entry(0.9, true), entry(0.2, true)]);

        // then
        assert_eq!(
            qualifying_commands,
            vec![MediaCmd::SetMuted(false), MediaCmd::Play { attempt: 1 }]
        );
        assert_eq!(short_commands, vec![MediaCmd::Pause]);
    }

    #[test]
    fn should_require_an_intersecting_latest_entry() {
        // given
        let mut controller = mounted();

        // when
        let commands = controller.on_visibility(&[entry(0.8, true), entry(0.7, false)]);

        // then
        assert_eq!(commands, vec![MediaCmd::Pause]);
    }

    #[test]
    fn should_let_a_pause_supersede_an_inflight_play_attempt() {
        // given
        let mut controller = mounted();
        controller.on_visibility(&[entry(1.0, true)]);

        // when
        let pause_commands = controller.on_visibility(&[entry(0.0, false)]);
        let stale_commands = controller.on_play_settled(1, PlayResult::Denied);

        // then
        assert_eq!(pause_commands, vec![MediaCmd::Pause]);
        assert!(stale_commands.is_empty());
        assert!(!controller.muted);
    }

    #[test]
    fn should_retry_muted_once_when_autoplay_is_denied() {
        // given
        let mut controller = mounted();
        controller.on_visibility(&[entry(1.0, true)]);

        // when
        let retry_commands = controller.on_play_settled(1, PlayResult::Denied);
        let second_denial = controller.on_play_settled(2, PlayResult::Denied);

        // then
        assert_eq!(
            retry_commands,
            vec![MediaCmd::SetMuted(true), MediaCmd::Play { attempt: 2 }]
        );
        assert!(second_denial.is_empty());
        assert!(controller.muted);
    }

    #[test]
    fn should_start_fresh_attempts_after_giving_up() {
        // given
        let mut controller = mounted();
        controller.on_visibility(&[entry(1.0, true)]);
        controller.on_play_settled(1, PlayResult::Denied);
        controller.on_play_settled(2, PlayResult::Denied);

        // when
        let commands = controller.on_visibility(&[entry(1.0, true)]);

        // then
        assert_eq!(
            commands,
            vec![MediaCmd::SetMuted(true), MediaCmd::Play { attempt: 3 }]
        );
    }

    #[test]
    fn should_not_retry_a_denial_when_already_muted() {
        // given
        let mut controller = mounted();
        controller.toggle_mute();
        controller.on_visibility(&[entry(1.0, true)]);

        // when
        let commands = controller.on_play_settled(1, PlayResult::Denied);

        // then
        assert!(commands.is_empty());
    }

    #[test]
    fn should_clear_the_attempt_once_playback_starts() {
        // given
        let mut controller = mounted();
        controller.on_visibility(&[entry(1.0, true)]);

        // when
        let started = controller.on_play_settled(1, PlayResult::Started);
        let late_denial = controller.on_play_settled(1, PlayResult::Denied);

        // then
        assert!(started.is_empty());
        assert!(late_denial.is_empty());
    }

    #[test]
    fn should_log_and_clear_a_failed_attempt_without_retrying() {
        // given
        let mut controller = mounted();
        controller.on_visibility(&[entry(1.0, true)]);

        // when
        let commands = controller.on_play_settled(1, PlayResult::Failed("decode error".to_string()));

        // then
        assert!(commands.is_empty());
        assert!(controller.pending.is_none());
        assert!(!controller.muted);
    }

    #[test]
    fn should_track_element_events() {
        // given
        let mut controller = mounted();

        // when / then
        controller.on_media_event(MediaEvent::Playing);
        assert_eq!(controller.state, PlayerState::PlayingUnmuted);
        controller.on_media_event(MediaEvent::Paused);
        assert_eq!(controller.state, PlayerState::Paused);
        controller.on_media_event(MediaEvent::Playing);
        assert_eq!(controller.state, PlayerState::PlayingUnmuted);
        controller.on_media_event(MediaEvent::Ended);
        assert_eq!(controller.state, PlayerState::Paused);
    }

    #[test]
    fn should_not_pause_the_state_before_playback_started() {
        // given
        let mut controller = mounted();

        // when
        controller.on_media_event(MediaEvent::Paused);

        // then
        assert_eq!(controller.state, PlayerState::Observing);
    }

    #[test]
    fn should_swallow_denials_of_user_requested_playback() {
        // given
        let mut controller = mounted();

        // when
        let play_commands = controller.play();
        let denial_commands = controller.on_play_settled(1, PlayResult::Denied);

        // then
        assert_eq!(
            play_commands,
            vec![MediaCmd::SetMuted(false), MediaCmd::Play { attempt: 1 }]
        );
        assert!(denial_commands.is_empty());
        assert!(!controller.muted);
    }

    #[test]
    fn should_pause_and_rewind_on_stop() {
        // given
        let mut controller = mounted();
        controller.on_visibility(&[entry(1.0, true)]);

        // when
        let commands = controller.stop();

        // then
        assert_eq!(commands, vec![MediaCmd::Pause, MediaCmd::SeekToStart]);
        assert!(controller.pending.is_none());
    }

    #[test]
    fn should_toggle_mute_without_touching_playback() {
        // given
        let mut controller = mounted();
        controller.on_media_event(MediaEvent::Playing);

        // when / then
        assert_eq!(controller.toggle_mute(), vec![MediaCmd::SetMuted(true)]);
        assert_eq!(controller.state, PlayerState::PlayingMuted);
        assert_eq!(controller.toggle_mute(), vec![MediaCmd::SetMuted(false)]);
        assert_eq!(controller.state, PlayerState::PlayingUnmuted);
    }

    #[test]
    fn should_swap_the_poster_to_the_fallback_once() {
        // given
        let mut controller = mounted();

        // when
        let first = controller.on_poster_error();
        let second = controller.on_poster_error();

        // then
        assert_eq!(
            first,
            vec![MediaCmd::SetPoster {
                src: "https://cdn.example.com/poster-fallback.jpg".to_string(),
            }]
        );
        assert!(second.is_empty());
    }

    #[test]
    fn should_swap_the_poster_even_without_an_initial_source() {
        // given
        let assets = vec![asset(MediaKind::Video, "https://cdn.example.com/clip.mp4")];
        let (mut controller, _) =
            PlaybackController::mount(ComponentId::new(), &assets, &embed_config());

        // when
        let commands = controller.on_poster_error();

        // then
        assert_eq!(
            commands,
            vec![MediaCmd::SetPoster {
                src: "https://cdn.example.com/poster-fallback.jpg".to_string(),
            }]
        );
    }

    #[test]
    fn should_unobserve_on_unmount() {
        // given
        let controller = mounted();

        // when
        let commands = controller.unmount();

        // then
        assert_eq!(commands, vec![MediaCmd::Unobserve]);
    }
}
