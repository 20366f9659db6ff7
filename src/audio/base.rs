//! State shared by every audio storage strategy: the owning manager, the
//! committed PCM format and the mutation hook.

use std::fmt;

use crate::audio::manager::MediaDataManager;
use crate::pcm::PcmFormat;
use crate::time::{Time, TimeDelta};

/// A structural change to an audio object, reported after it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationEvent {
    FormatChanged {
        previous: Option<PcmFormat>,
        current: PcmFormat,
    },
    Inserted {
        at: Time,
        duration: TimeDelta,
    },
    Removed {
        begin: Time,
        duration: TimeDelta,
    },
}

/// Synchronous on-mutation callback. It receives only the event, never the
/// audio object, so it cannot call back into it.
pub type MutationHook = Box<dyn FnMut(&MutationEvent) + Send>;

pub struct AudioCore {
    manager: MediaDataManager,
    format: Option<PcmFormat>,
    hook: Option<MutationHook>,
}

impl AudioCore {
    pub fn new(manager: MediaDataManager) -> Self {
        AudioCore {
            manager,
            format: None,
            hook: None,
        }
    }

    pub fn manager(&self) -> &MediaDataManager {
        &self.manager
    }

    /// The committed format, `None` while the object is still `Empty`.
    pub fn format(&self) -> Option<PcmFormat> {
        self.format
    }

    pub(crate) fn commit_format(&mut self, format: PcmFormat) {
        self.format = Some(format);
    }

    pub(crate) fn set_hook(&mut self, hook: Option<MutationHook>) {
        self.hook = hook;
    }

    pub(crate) fn notify(&mut self, event: MutationEvent) {
        if let Some(hook) = self.hook.as_mut() {
            hook(&event);
        }
    }
}

impl fmt::Debug for AudioCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioCore")
            .field("format", &self.format)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}
