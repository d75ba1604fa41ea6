//! Ordered per-room track queue

use std::collections::VecDeque;

use tunecatalog::Track;

/// A track waiting in a room queue
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedTrack {
    /// Monotonic within a room, never reused
    pub id: u64,
    pub track: Track,
}

/// Tracks waiting to be played, head first
///
/// The currently playing track is not part of the queue: the head is only
/// removed once a playable resource exists for it or its play attempt failed.
#[derive(Clone, Debug, Default)]
pub struct RoomQueue {
    entries: VecDeque<QueuedTrack>,
    next_id: u64,
}

impl RoomQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a track and returns its entry id
    pub fn enqueue(&mut self, track: Track) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push_back(QueuedTrack { id, track });
        id
    }

    /// Appends every track, keeping their order; returns how many were added
    pub fn enqueue_many<I: IntoIterator<Item = Track>>(&mut self, tracks: I) -> usize {
        let before = self.entries.len();
        for track in tracks {
            self.enqueue(track);
        }
        self.entries.len() - before
    }

    pub fn head(&self) -> Option<&QueuedTrack> {
        self.entries.front()
    }

    /// Removes the head only if it is still the entry `id`
    pub fn pop_head_if(&mut self, id: u64) -> Option<QueuedTrack> {
        match self.entries.front() {
            Some(head) if head.id == id => self.entries.pop_front(),
            _ => None,
        }
    }

    /// Empties the queue and returns the number of dropped tracks
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    /// The first `n` tracks, head first
    pub fn upcoming(&self, n: usize) -> Vec<Track> {
        self.entries.iter().take(n).map(|e| e.track.clone()).collect()
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.upcoming(self.entries.len())
    }
}
