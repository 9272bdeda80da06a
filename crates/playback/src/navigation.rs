use shared::domain::Slide;

use crate::PlaybackError;

pub fn next_index(current: usize, len: usize) -> usize {
    current.saturating_add(1).min(len.saturating_sub(1))
}

pub fn prev_index(current: usize) -> usize {
    current.saturating_sub(1)
}

pub fn clamp_index(target: usize, len: usize) -> usize {
    target.min(len.saturating_sub(1))
}

/// Non-empty slide list ordered by slide index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deck {
    slides: Vec<Slide>,
}

impl Deck {
    pub fn new(mut slides: Vec<Slide>) -> Result<Self, PlaybackError> {
        if slides.is_empty() {
            return Err(PlaybackError::EmptyDeck);
        }
        slides.sort_by_key(|slide| slide.index);
        if let Some(pair) = slides.windows(2).find(|pair| pair[0].index == pair[1].index) {
            return Err(PlaybackError::DuplicateIndex(pair[0].index));
        }
        Ok(Self { slides })
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn last_index(&self) -> usize {
        self.slides.len() - 1
    }

    pub fn get(&self, position: usize) -> Option<&Slide> {
        self.slides.get(position)
    }

    /// Slide at `position`, clamped into the deck.
    pub fn slide(&self, position: usize) -> &Slide {
        &self.slides[clamp_index(position, self.slides.len())]
    }

    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    pub fn into_slides(self) -> Vec<Slide> {
        self.slides
    }
}

#[cfg(test)]
#[path = "tests/navigation_tests.rs"]
mod tests;
