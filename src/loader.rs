use log::{debug, warn};
use thiserror::Error;
use url::Url;

use crate::{config::EmbedConfig, media::ComponentId, messages::dto};

pub const SCRIPT_ELEMENT_ID: &str = "vantage-maps-sdk";

const MAPS_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/js";
const MAPS_LIBRARIES: &str = "places";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentView {
    pub maps_ready: bool,
    pub loader_script_present: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("no maps API key is configured")]
    ConfigurationMissing,

    #[error("maps script failed to load: {0}")]
    Load(String),
}

impl From<&LoadError> for dto::ScriptErrorReasonV1 {
    fn from(value: &LoadError) -> Self {
        match value {
            LoadError::ConfigurationMissing => Self::ConfigurationMissing,
            LoadError::Load(_) => Self::LoadFailed,
        }
    }
}

pub type LoadOutcome = Result<(), LoadError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTag {
    pub id: &'static str,
    pub src: String,
    pub load_async: bool,
    pub defer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCmd {
    Insert(ScriptTag),
    Watch { id: &'static str },
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoadReply {
    Settled(LoadOutcome),
    Pending { cmd: Option<ScriptCmd> },
}

#[derive(Debug)]
enum LoadState {
    Idle,
    Pending { waiters: Vec<ComponentId> },
    Settled(LoadOutcome),
}

pub struct ScriptLoader {
    api_key: Option<String>,
    state: LoadState,
}

impl ScriptLoader {
    pub fn new(config: &EmbedConfig) -> Self {
        Self {
            api_key: config.maps_api_key.clone(),
            state: LoadState::Idle,
        }
    }

    pub fn request(&mut self, requester: ComponentId, document: &DocumentView) -> LoadReply {
        if document.maps_ready {
            debug!("Maps marker already present, component {requester} is ready immediately");
            return LoadReply::Settled(Ok(()));
        }

        match &mut self.state {
            LoadState::Settled(outcome) => LoadReply::Settled(outcome.clone()),
            LoadState::Pending { waiters } => {
                debug!("Maps script already loading, component {requester} joins the waiters");
                waiters.push(requester);
                LoadReply::Pending { cmd: None }
            }
            LoadState::Idle => {
                let Some(key) = self.api_key.as_deref().filter(|key| !key.trim().is_empty())
                else {
                    warn!("Component {requester} requested the maps script, but no API key is configured");
                    return LoadReply::Settled(Err(LoadError::ConfigurationMissing));
                };

                let cmd = if document.loader_script_present {
                    // A previous page left the element behind; listen to it instead of
                    // inserting a duplicate.
                    debug!("Script element #{SCRIPT_ELEMENT_ID} already present, watching it");
                    ScriptCmd::Watch {
                        id: SCRIPT_ELEMENT_ID,
                    }
                } else {
                    ScriptCmd::Insert(ScriptTag {
                        id: SCRIPT_ELEMENT_ID,
                        src: script_src(key),
                        load_async: true,
                        defer: true,
                    })
                };
                self.state = LoadState::Pending {
                    waiters: vec![requester],
                };
                LoadReply::Pending { cmd: Some(cmd) }
            }
        }
    }

    pub fn settle(&mut self, outcome: LoadOutcome) -> Vec<(ComponentId, LoadOutcome)> {
        let previous = std::mem::replace(&mut self.state, LoadState::Settled(outcome.clone()));
        match previous {
            LoadState::Pending { waiters } => {
                match &outcome {
                    Ok(()) => debug!("Maps script loaded, notifying {} waiters", waiters.len()),
                    Err(err) => warn!("Maps script load failed for {} waiters: {err}", waiters.len()),
                }
                waiters
                    .into_iter()
                    .map(|component| (component, outcome.clone()))
                    .collect()
            }
            previous => {
                self.state = previous;
                warn!("Ignoring a script settlement without a pending load");
                Vec::new()
            }
        }
    }
}

fn script_src(key: &str) -> String {
    let mut url = Url::parse(MAPS_ENDPOINT).expect("maps endpoint is a valid URL");
    url.query_pairs_mut()
        .append_pair("key", key)
        .append_pair("libraries", MAPS_LIBRARIES);
    url.into()
}
