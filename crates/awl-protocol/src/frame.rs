//! Detection Frame Model

use serde::{Deserialize, Serialize};

/// One detection of a pixel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: u16,
    pub confidence_level: u8,
    pub intensity: u16,
    /// Distance (cm)
    pub distance: u16,
    /// Speed (cm/s)
    pub speed: i16,
    /// Acceleration (cm/s²)
    pub acceleration: i16,
}

/// A sensor pixel and the tracks it reported during one frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pixel {
    pub id: u16,
    pub tracks: Vec<Track>,
}

/// Complete set of detections between two end-of-frame messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub frame_id: u16,
    pub system_id: u16,
    pub pixels: Vec<Pixel>,
}

impl Frame {
    /// Insert `track` under `pixel_id`, replacing a track with the same id
    /// anywhere in the frame
    pub fn upsert_track(&mut self, pixel_id: u16, track: Track) {
        for pixel in &mut self.pixels {
            pixel.tracks.retain(|t| t.id != track.id);
        }
        self.pixels.retain(|p| p.id == pixel_id || !p.tracks.is_empty());

        match self.pixels.iter_mut().find(|p| p.id == pixel_id) {
            Some(pixel) => pixel.tracks.push(track),
            None => self.pixels.push(Pixel {
                id: pixel_id,
                tracks: vec![track],
            }),
        }
    }

    /// Find a track by id
    pub fn track_mut(&mut self, track_id: u16) -> Option<&mut Track> {
        self.pixels
            .iter_mut()
            .flat_map(|p| p.tracks.iter_mut())
            .find(|t| t.id == track_id)
    }

    /// Total number of tracks across all pixels
    pub fn track_count(&self) -> usize {
        self.pixels.iter().map(|p| p.tracks.len()).sum()
    }

    /// Whether the frame holds no detections
    pub fn is_empty(&self) -> bool {
        self.track_count() == 0
    }
}
