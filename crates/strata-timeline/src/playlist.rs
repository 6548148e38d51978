//! Playlists: producers that play a sequence of clips and blanks.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use strata_core::{
    Context, Frame, Position, Producer, ProducerImpl, Result, Service, ServiceKind, StrataError,
};

/// One playlist entry.
#[derive(Debug, Clone)]
pub enum PlaylistEntry {
    /// `[in_point, out_point]` of `producer`.
    Clip {
        producer: Producer,
        in_point: Position,
        out_point: Position,
    },
    Blank { length: Position },
}

impl PlaylistEntry {
    /// Number of frames this entry occupies.
    pub fn length(&self) -> Position {
        match self {
            PlaylistEntry::Clip {
                in_point,
                out_point,
                ..
            } => out_point - in_point + 1,
            PlaylistEntry::Blank { length } => *length,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, PlaylistEntry::Blank { .. })
    }
}

/// Where an entry sits in a playlist.
#[derive(Debug, Clone)]
pub struct ClipInfo {
    pub index: usize,
    /// First playlist position of the entry.
    pub start: Position,
    pub length: Position,
    /// `None` for blanks.
    pub producer: Option<Producer>,
    pub in_point: Position,
    pub out_point: Position,
}

#[derive(Default)]
struct PlaylistState {
    entries: RwLock<Vec<PlaylistEntry>>,
}

impl PlaylistState {
    fn total(&self) -> Position {
        self.entries.read().iter().map(PlaylistEntry::length).sum()
    }

    /// Entry covering `position` and the offset into it.
    fn locate(&self, position: Position) -> Option<(usize, PlaylistEntry, Position)> {
        if position < 0 {
            return None;
        }
        let mut start = 0;
        for (i, entry) in self.entries.read().iter().enumerate() {
            let end = start + entry.length();
            if position < end {
                return Some((i, entry.clone(), position - start));
            }
            start = end;
        }
        None
    }
}

struct Sequencer {
    state: Arc<PlaylistState>,
}

impl ProducerImpl for Sequencer {
    fn produce(&self, playlist: &Producer, position: Position) -> Result<Frame> {
        match self.state.locate(position) {
            Some((
                _,
                PlaylistEntry::Clip {
                    producer, in_point, ..
                },
                offset,
            )) => {
                producer.seek_frame(in_point + offset)?;
                Ok(producer.get_frame(0))
            }
            _ => Ok(Frame::blank(playlist.context(), position)),
        }
    }
}

/// Handle on a playlist.
#[derive(Clone)]
pub struct Playlist {
    producer: Producer,
    state: Arc<PlaylistState>,
}

impl Playlist {
    pub fn new(ctx: &Context) -> Self {
        let state = Arc::new(PlaylistState::default());
        let producer = Producer::with_kind(
            ServiceKind::Playlist,
            ctx,
            Sequencer {
                state: Arc::clone(&state),
            },
        );
        let playlist = Self { producer, state };
        playlist.refresh();
        playlist
    }

    /// View a service as a playlist, if it is one.
    pub fn from_service(service: Service) -> Option<Self> {
        let producer = Producer::from_service(service)?;
        let state = Arc::clone(&producer.implementation::<Sequencer>()?.state);
        Some(Self { producer, state })
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    /// Recompute length and out point after an edit.
    fn refresh(&self) {
        let total = self.state.total();
        let _ = self.producer.set_length(total);
        debug!(entries = self.count(), length = total, "playlist updated");
    }

    fn clip_entry(&self, producer: &Producer, in_point: Position, out_point: Position) -> Result<PlaylistEntry> {
        if Service::ptr_eq(producer.service(), self.producer.service()) {
            return Err(StrataError::InvalidParameter(
                "a playlist cannot contain itself".into(),
            ));
        }
        let last = producer.length() - 1;
        let in_point = in_point.clamp(0, last.max(0));
        let out_point = if out_point < 0 { last } else { out_point.min(last) };
        if out_point < in_point {
            return Err(StrataError::InvalidParameter(format!(
                "clip out point {out_point} precedes in point {in_point}"
            )));
        }
        Ok(PlaylistEntry::Clip {
            producer: producer.clone(),
            in_point,
            out_point,
        })
    }

    /// Append `[in_point, out_point]` of `producer`; a negative `out_point`
    /// means the producer's last frame.
    pub fn append(&self, producer: &Producer, in_point: Position, out_point: Position) -> Result<()> {
        let entry = self.clip_entry(producer, in_point, out_point)?;
        self.state.entries.write().push(entry);
        self.refresh();
        Ok(())
    }

    /// Append `length` frames of nothing.
    pub fn blank(&self, length: Position) -> Result<()> {
        if length <= 0 {
            return Err(StrataError::InvalidParameter(format!(
                "blank length must be positive, got {length}"
            )));
        }
        self.state.entries.write().push(PlaylistEntry::Blank { length });
        self.refresh();
        Ok(())
    }

    /// Insert a clip before entry `index` (appending past the end).
    pub fn insert(
        &self,
        producer: &Producer,
        index: usize,
        in_point: Position,
        out_point: Position,
    ) -> Result<()> {
        let entry = self.clip_entry(producer, in_point, out_point)?;
        {
            let mut entries = self.state.entries.write();
            let index = index.min(entries.len());
            entries.insert(index, entry);
        }
        self.refresh();
        Ok(())
    }

    /// Remove entry `index`, returning it.
    pub fn remove(&self, index: usize) -> Option<PlaylistEntry> {
        let removed = {
            let mut entries = self.state.entries.write();
            (index < entries.len()).then(|| entries.remove(index))
        };
        if removed.is_some() {
            self.refresh();
        }
        removed
    }

    /// Merge adjacent blanks.
    pub fn consolidate_blanks(&self) {
        {
            let mut entries = self.state.entries.write();
            let mut i = 0;
            while i + 1 < entries.len() {
                if let (PlaylistEntry::Blank { length: a }, PlaylistEntry::Blank { length: b }) =
                    (&entries[i], &entries[i + 1])
                {
                    let merged = a + b;
                    entries[i] = PlaylistEntry::Blank { length: merged };
                    entries.remove(i + 1);
                } else {
                    i += 1;
                }
            }
        }
        self.refresh();
    }

    pub fn clear(&self) {
        self.state.entries.write().clear();
        self.refresh();
    }

    pub fn count(&self) -> usize {
        self.state.entries.read().len()
    }

    pub fn entry(&self, index: usize) -> Option<PlaylistEntry> {
        self.state.entries.read().get(index).cloned()
    }

    /// Total number of frames.
    pub fn total_length(&self) -> Position {
        self.state.total()
    }

    /// First playlist position of entry `index`; the total length when
    /// `index` is past the end.
    pub fn clip_start(&self, index: usize) -> Position {
        self.state
            .entries
            .read()
            .iter()
            .take(index)
            .map(PlaylistEntry::length)
            .sum()
    }

    /// Length of entry `index`; 0 when there is none.
    pub fn clip_length(&self, index: usize) -> Position {
        self.entry(index).map_or(0, |entry| entry.length())
    }

    pub fn is_blank(&self, index: usize) -> bool {
        self.entry(index).is_some_and(|entry| entry.is_blank())
    }

    pub fn clip_info(&self, index: usize) -> Option<ClipInfo> {
        let entry = self.entry(index)?;
        let start = self.clip_start(index);
        let length = entry.length();
        Some(match entry {
            PlaylistEntry::Clip {
                producer,
                in_point,
                out_point,
            } => ClipInfo {
                index,
                start,
                length,
                producer: Some(producer),
                in_point,
                out_point,
            },
            PlaylistEntry::Blank { length } => ClipInfo {
                index,
                start,
                length,
                producer: None,
                in_point: 0,
                out_point: length - 1,
            },
        })
    }

    /// Index of the entry covering playlist position `position`.
    pub fn get_clip_index_at(&self, position: Position) -> Option<usize> {
        self.state.locate(position).map(|(index, _, _)| index)
    }
}

impl Deref for Playlist {
    type Target = Producer;

    fn deref(&self) -> &Producer {
        &self.producer
    }
}

impl std::fmt::Debug for Playlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playlist")
            .field("entries", &*self.state.entries.read())
            .field("position", &self.producer.position())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct Numbered;

    impl ProducerImpl for Numbered {
        fn produce(&self, producer: &Producer, position: Position) -> Result<Frame> {
            let frame = Frame::from_context(producer.context(), position);
            frame.set("source", &producer.get("name").unwrap_or_default())?;
            frame.set_position("source_position", position)?;
            Ok(frame)
        }
    }

    fn clip(ctx: &Context, name: &str, length: Position) -> Producer {
        let producer = Producer::new(ctx, Numbered);
        producer.set_length(length).unwrap();
        producer.set("name", name).unwrap();
        producer
    }

    #[test]
    fn test_routes_positions_to_clips() {
        let ctx = Context::default();
        let playlist = Playlist::new(&ctx);
        playlist.append(&clip(&ctx, "a", 100), 10, 12).unwrap();
        playlist.blank(2).unwrap();
        playlist.append(&clip(&ctx, "b", 50), 0, 1).unwrap();
        assert_eq!(playlist.length(), 7);
        assert_eq!(playlist.get_out(), 6);

        let frames: Vec<Frame> = (0..7).map(|_| playlist.get_frame(0)).collect();
        let sources: Vec<String> = frames
            .iter()
            .map(|f| f.get("source").unwrap_or_else(|| "-".into()))
            .collect();
        assert_eq!(sources, ["a", "a", "a", "-", "-", "b", "b"]);
        assert_eq!(frames[1].get_position("source_position"), 11);
        assert!(frames[3].is_test_card());
        assert_eq!(
            frames.iter().map(Frame::position).collect::<Vec<_>>(),
            (0..7).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_clip_queries() {
        let ctx = Context::default();
        let playlist = Playlist::new(&ctx);
        playlist.append(&clip(&ctx, "a", 10), 0, -1).unwrap();
        playlist.blank(5).unwrap();
        playlist.insert(&clip(&ctx, "b", 3), 0, 0, -1).unwrap();

        assert_eq!(playlist.count(), 3);
        assert_eq!(playlist.clip_start(1), 3);
        assert_eq!(playlist.clip_start(2), 13);
        assert_eq!(playlist.clip_start(9), 18);
        assert_eq!(playlist.clip_length(1), 10);
        assert!(playlist.is_blank(2));
        assert_eq!(playlist.get_clip_index_at(12), Some(1));
        assert_eq!(playlist.get_clip_index_at(18), None);

        let info = playlist.clip_info(1).unwrap();
        assert_eq!((info.start, info.length, info.out_point), (3, 10, 9));
        assert_eq!(info.producer.unwrap().get("name").as_deref(), Some("a"));
        assert!(playlist.clip_info(2).unwrap().producer.is_none());

        assert!(playlist.remove(0).is_some());
        assert!(playlist.remove(7).is_none());
        assert_eq!(playlist.length(), 15);
    }

    #[test]
    fn test_consolidate_and_invalid_edits() {
        let ctx = Context::default();
        let playlist = Playlist::new(&ctx);
        playlist.blank(2).unwrap();
        playlist.blank(3).unwrap();
        playlist.consolidate_blanks();
        assert_eq!(playlist.count(), 1);
        assert_eq!(playlist.clip_length(0), 5);

        assert!(playlist.blank(0).is_err());
        assert!(playlist.append(playlist.producer(), 0, -1).is_err());
        let round_trip = Playlist::from_service(playlist.service().clone()).unwrap();
        assert_eq!(round_trip.count(), 1);
        playlist.clear();
        assert!(playlist.get_frame(0).is_test_card());
    }

    #[test]
    fn test_empty_playlist_has_zero_length() {
        let ctx = Context::default();
        let playlist = Playlist::new(&ctx);
        assert_eq!((playlist.length(), playlist.total_length()), (0, 0));
        assert_eq!(playlist.playtime(), 0);

        playlist.blank(3).unwrap();
        assert_eq!(playlist.length(), 3);
        playlist.clear();
        assert_eq!((playlist.length(), playlist.get_out()), (0, -1));
        let frame = playlist.get_frame(0);
        assert!(frame.is_test_card());
        assert_eq!(frame.position(), 0);
        assert_eq!(playlist.position(), 0);
    }

    proptest! {
        #[test]
        fn prop_clip_index_matches_starts(lengths in prop::collection::vec(1i64..20, 1..8), position in 0i64..200) {
            let ctx = Context::default();
            let playlist = Playlist::new(&ctx);
            for length in &lengths {
                playlist.blank(*length).unwrap();
            }
            match playlist.get_clip_index_at(position) {
                Some(i) => {
                    let start = playlist.clip_start(i);
                    prop_assert!(start <= position && position < start + playlist.clip_length(i));
                }
                None => prop_assert!(position >= playlist.total_length()),
            }
        }
    }
}
