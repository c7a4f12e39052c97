use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use super::image_set::ImageSet;
use crate::error::{Error, Result};

/// Playback controls, shared by the IR remote and the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    Next,
    Previous,
    NextSet,
    PreviousSet,
    /// With one set: toggle auto/manual. With several: cycle to the next set.
    Mode,
}

/// The running show: every image set plus which one is on screen
#[derive(Debug)]
pub struct Show {
    sets: Vec<ImageSet>,
    current: usize,
    auto: bool,
}

impl Show {
    pub fn new(sets: Vec<ImageSet>) -> Result<Self> {
        let auto = sets
            .first()
            .map(|set| set.auto)
            .ok_or_else(|| Error::InvalidConfig("no image sets to show".to_string()))?;
        Ok(Show {
            sets,
            current: 0,
            auto,
        })
    }

    pub fn sets(&self) -> &[ImageSet] {
        &self.sets
    }

    pub fn set_mut(&mut self, index: usize) -> Option<&mut ImageSet> {
        self.sets.get_mut(index)
    }

    #[cfg(test)]
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_set(&self) -> &ImageSet {
        &self.sets[self.current]
    }

    fn current_set_mut(&mut self) -> &mut ImageSet {
        &mut self.sets[self.current]
    }

    pub fn is_auto(&self) -> bool {
        self.auto
    }

    pub fn current_image(&self) -> Option<&Path> {
        self.current_set().current_image()
    }

    /// Index of the current set when it is due a refresh
    ///
    /// Manual mode never refreshes the set being browsed, so the operator
    /// is not thrown back to the first slide mid-presentation.
    pub fn due_for_refresh(&self, now: DateTime<Utc>) -> Option<usize> {
        if self.auto && self.current_set().refresh_due(now) {
            Some(self.current)
        } else {
            None
        }
    }

    /// Timer tick: advance when in auto mode. Returns whether the slide changed.
    pub fn tick(&mut self) -> bool {
        if !self.auto {
            return false;
        }
        let image = self.current_set_mut().advance().map(Path::to_path_buf);
        debug!(set = self.current, image = ?image, "auto advance");
        true
    }

    /// Select a set by index, clamped to the valid range
    pub fn select_set(&mut self, index: usize) {
        self.current = index.min(self.sets.len() - 1);
        self.auto = self.current_set().auto;
        info!(
            set = %self.current_set().name(),
            auto = self.auto,
            "switched image set"
        );
    }

    /// Move through the sets by `delta`, wrapping at both ends
    pub fn cycle_set(&mut self, delta: isize) {
        let count = self.sets.len() as isize;
        let next = (self.current as isize + delta).rem_euclid(count);
        self.select_set(next as usize);
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::Next => {
                self.current_set_mut().advance();
            }
            Command::Previous => {
                self.current_set_mut().previous();
            }
            Command::NextSet => self.cycle_set(1),
            Command::PreviousSet => self.cycle_set(-1),
            Command::Mode => {
                if self.sets.len() == 1 {
                    self.auto = !self.auto;
                    info!(auto = self.auto, "toggled playback mode");
                    if !self.auto {
                        self.current_set_mut().order();
                    }
                } else {
                    self.cycle_set(1);
                }
            }
        }
        debug!(?command, image = ?self.current_image(), "applied command");
    }
}
