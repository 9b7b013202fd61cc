use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Difficulty bucket derived from a text's word count.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    strum_macros::Display,
)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn from_word_count(words: usize) -> Self {
        match words {
            0..=5 => Difficulty::Easy,
            6..=12 => Difficulty::Medium,
            _ => Difficulty::Hard,
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::from_word_count(text.split_whitespace().count())
    }
}

/// A piece of practice text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub text: String,
    pub difficulty: Difficulty,
    pub theme: String,
}

impl ContentItem {
    pub fn new(id: impl Into<String>, text: impl Into<String>, theme: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: id.into(),
            difficulty: Difficulty::from_text(&text),
            text,
            theme: theme.into(),
        }
    }
}

pub trait ContentProvider {
    fn get(&self, id: &str) -> Option<ContentItem>;
    fn pick(&self, difficulty: Option<Difficulty>) -> Option<ContentItem>;
}

const BUILTIN: &[(&str, &str, &str)] = &[
    ("animals-1", "the cat sat on a mat", "animals"),
    ("animals-2", "a big dog ran to the park to play", "animals"),
    ("animals-3", "the little fox jumps over the sleepy dog and runs home to eat", "animals"),
    ("space-1", "we can see the moon", "space"),
    ("space-2", "the rocket flies up past the stars and the moon", "space"),
    ("space-3", "far away in space a bright comet zooms past a planet with three moons", "space"),
    ("food-1", "i like red apples", "food"),
    ("food-2", "mom made soup and warm bread for our lunch", "food"),
    ("ocean-1", "fish swim in the sea", "ocean"),
    ("ocean-2", "a happy whale sings a song under the deep blue waves of the ocean", "ocean"),
];

/// Child-friendly sentences bundled with the binary.
#[derive(Debug, Clone)]
pub struct BuiltinContent {
    items: Vec<ContentItem>,
}

impl BuiltinContent {
    pub fn new() -> Self {
        Self {
            items: BUILTIN
                .iter()
                .map(|(id, text, theme)| ContentItem::new(*id, *text, *theme))
                .collect(),
        }
    }
}

impl Default for BuiltinContent {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentProvider for BuiltinContent {
    fn get(&self, id: &str) -> Option<ContentItem> {
        self.items.iter().find(|item| item.id == id).cloned()
    }

    fn pick(&self, difficulty: Option<Difficulty>) -> Option<ContentItem> {
        let candidates: Vec<&ContentItem> = self
            .items
            .iter()
            .filter(|item| difficulty.map_or(true, |d| item.difficulty == d))
            .collect();
        candidates.choose(&mut rand::thread_rng()).map(|item| (*item).clone())
    }
}
