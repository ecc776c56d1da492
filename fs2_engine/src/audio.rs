use std::{cell::RefCell, rc::Rc, sync::Arc};

use log::debug;
use serde::Serialize;

use crate::cache::AssetCache;
use crate::config::{CHANNEL_COUNT, PCM_CHANNEL};
use crate::error::{EngineError, EngineResult};

/// Loop count meaning "repeat until stopped".
pub const LOOP_FOREVER: i32 = -1;

/// Mixer capability. Buffers are still in their compressed container format.
pub trait AudioBackend {
    fn play_music(&mut self, name: &str, data: &[u8]);
    fn stop_music(&mut self);
    fn play(&mut self, channel: usize, name: &str, data: &[u8], loops: i32);
    fn halt(&mut self, channel: usize);
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioEvent {
    MusicPlay { name: String, bytes: usize },
    MusicStop,
    Play { channel: usize, name: String, loops: i32 },
    Halt { channel: usize },
}

#[derive(Clone, Default)]
pub struct RecordingAudioBackend {
    events: Rc<RefCell<Vec<AudioEvent>>>,
}

impl RecordingAudioBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AudioEvent> {
        self.events.borrow().clone()
    }
}

impl AudioBackend for RecordingAudioBackend {
    fn play_music(&mut self, name: &str, data: &[u8]) {
        self.events.borrow_mut().push(AudioEvent::MusicPlay {
            name: name.to_string(),
            bytes: data.len(),
        });
    }

    fn stop_music(&mut self) {
        self.events.borrow_mut().push(AudioEvent::MusicStop);
    }

    fn play(&mut self, channel: usize, name: &str, _data: &[u8], loops: i32) {
        self.events.borrow_mut().push(AudioEvent::Play {
            channel,
            name: name.to_string(),
            loops,
        });
    }

    fn halt(&mut self, channel: usize) {
        self.events.borrow_mut().push(AudioEvent::Halt { channel });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChannelState {
    pub name: String,
    pub loops: i32,
}

/// Music plus a fixed bank of effect channels. Each binding is recorded
/// before its fetch goes out; deliveries that no longer match are dropped.
pub struct AudioChannelManager {
    backend: Box<dyn AudioBackend>,
    music: Option<String>,
    music_in_flight: Option<String>,
    channels: [Option<AudioChannelState>; CHANNEL_COUNT],
    music_cache: AssetCache<Arc<Vec<u8>>>,
}

impl AudioChannelManager {
    pub fn new(backend: Box<dyn AudioBackend>, music_cache_capacity: Option<usize>) -> Self {
        AudioChannelManager {
            backend,
            music: None,
            music_in_flight: None,
            channels: Default::default(),
            music_cache: AssetCache::new(music_cache_capacity),
        }
    }

    /// The authoritative track, whether playing or still in flight.
    pub fn music(&self) -> Option<&str> {
        self.music.as_deref()
    }

    pub fn channel(&self, channel: usize) -> Option<&AudioChannelState> {
        self.channels.get(channel).and_then(Option::as_ref)
    }

    /// Channels bound with [`LOOP_FOREVER`].
    pub fn looping_effects(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.channels
            .iter()
            .enumerate()
            .filter_map(|(channel, state)| match state {
                Some(state) if state.loops == LOOP_FOREVER => Some((channel, state.name.as_str())),
                _ => None,
            })
    }

    /// Plays `name` at once when cached. Otherwise records it as pending and
    /// returns true so the caller issues the fetch, unless a fetch for the
    /// same track is already out.
    pub fn set_music(&mut self, name: &str) -> bool {
        self.music = Some(name.to_string());
        if let Some(data) = self.music_cache.get(name).cloned() {
            self.backend.play_music(name, &data);
            return false;
        }
        if self
            .music_in_flight
            .as_deref()
            .is_some_and(|pending| pending.eq_ignore_ascii_case(name))
        {
            debug!("music {name} is already being fetched");
            return false;
        }
        self.music_in_flight = Some(name.to_string());
        true
    }

    pub fn deliver_music(&mut self, name: &str, data: Vec<u8>) -> bool {
        if self
            .music_in_flight
            .as_deref()
            .is_some_and(|pending| pending.eq_ignore_ascii_case(name))
        {
            self.music_in_flight = None;
        }
        let data = Arc::new(data);
        self.music_cache.insert_if_absent(name, Arc::clone(&data));
        if self.music.as_deref() != Some(name) {
            debug!("discarding stale music {name}");
            return false;
        }
        self.backend.play_music(name, &data);
        true
    }

    pub fn stop_music(&mut self) {
        self.music = None;
        self.backend.stop_music();
    }

    fn check_channel(channel: usize) -> EngineResult<()> {
        if channel >= CHANNEL_COUNT {
            return Err(EngineError::index("channel", channel, CHANNEL_COUNT));
        }
        Ok(())
    }

    /// Halts the channel and binds `name` to it; the caller issues the fetch.
    /// The PCM channel is always bound one-shot, whatever `loops` asks for.
    pub fn set_effect(&mut self, name: &str, channel: usize, loops: i32) -> EngineResult<()> {
        Self::check_channel(channel)?;
        let loops = if channel == PCM_CHANNEL && loops != 0 {
            debug!("pcm channel ignores loop count {loops} for {name}");
            0
        } else {
            loops
        };
        self.backend.halt(channel);
        self.channels[channel] = Some(AudioChannelState {
            name: name.to_string(),
            loops,
        });
        Ok(())
    }

    pub fn set_pcm(&mut self, name: &str) -> EngineResult<()> {
        self.set_effect(name, PCM_CHANNEL, 0)
    }

    pub fn deliver_effect(&mut self, channel: usize, name: &str, data: &[u8]) -> bool {
        let Some(state) = self.channel(channel) else {
            debug!("discarding {name}: channel {channel} was stopped");
            return false;
        };
        if state.name != name {
            debug!("discarding stale effect {name} on channel {channel}");
            return false;
        }
        let loops = state.loops;
        self.backend.play(channel, name, data, loops);
        true
    }

    pub fn stop_channel(&mut self, channel: usize) -> EngineResult<()> {
        Self::check_channel(channel)?;
        self.backend.halt(channel);
        self.channels[channel] = None;
        Ok(())
    }

    pub fn stop_all(&mut self) {
        for channel in 0..CHANNEL_COUNT {
            if self.channels[channel].take().is_some() {
                self.backend.halt(channel);
            }
        }
        self.stop_music();
    }
}
