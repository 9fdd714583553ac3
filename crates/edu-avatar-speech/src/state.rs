//! Observable speech flags for UI layers.

use std::sync::Arc;

use tokio::sync::watch;

use edu_avatar_core::types::{AvatarGender, AvatarState};

struct Flags {
    recording: watch::Sender<bool>,
    playing: watch::Sender<bool>,
    avatar: watch::Sender<AvatarState>,
    gender: watch::Sender<AvatarGender>,
}

/// Shared `recording` / `playing` / avatar flags.
///
/// Cloning is cheap; all clones observe the same values. Each flag can be
/// watched through its `subscribe_*` receiver.
#[derive(Clone)]
pub struct SpeechState {
    flags: Arc<Flags>,
}

impl Default for SpeechState {
    fn default() -> Self {
        Self::new(AvatarGender::default())
    }
}

impl SpeechState {
    pub fn new(gender: AvatarGender) -> Self {
        Self {
            flags: Arc::new(Flags {
                recording: watch::channel(false).0,
                playing: watch::channel(false).0,
                avatar: watch::channel(AvatarState::Idle).0,
                gender: watch::channel(gender).0,
            }),
        }
    }

    pub fn recording(&self) -> bool {
        *self.flags.recording.borrow()
    }

    pub fn playing(&self) -> bool {
        *self.flags.playing.borrow()
    }

    pub fn avatar_state(&self) -> AvatarState {
        *self.flags.avatar.borrow()
    }

    pub fn avatar_gender(&self) -> AvatarGender {
        *self.flags.gender.borrow()
    }

    pub fn set_recording(&self, recording: bool) {
        self.flags.recording.send_replace(recording);
    }

    pub fn set_playing(&self, playing: bool) {
        self.flags.playing.send_replace(playing);
    }

    pub fn set_avatar_state(&self, state: AvatarState) {
        self.flags.avatar.send_replace(state);
    }

    pub fn set_avatar_gender(&self, gender: AvatarGender) {
        self.flags.gender.send_replace(gender);
    }

    /// Derive the avatar state from whichever pipeline is still active.
    pub fn settle_avatar(&self) {
        let state = if self.playing() {
            AvatarState::Speaking
        } else if self.recording() {
            AvatarState::Listening
        } else {
            AvatarState::Idle
        };
        self.set_avatar_state(state);
    }

    pub fn subscribe_recording(&self) -> watch::Receiver<bool> {
        self.flags.recording.subscribe()
    }

    pub fn subscribe_playing(&self) -> watch::Receiver<bool> {
        self.flags.playing.subscribe()
    }

    pub fn subscribe_avatar_state(&self) -> watch::Receiver<AvatarState> {
        self.flags.avatar.subscribe()
    }
}
