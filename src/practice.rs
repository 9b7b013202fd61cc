//! One typing round over a prompt: tracks what was typed, closes words as they are
//! completed and forwards keystrokes and words to the engine.

use crate::clock::Clock;
use crate::engine::{FeedingResult, Typingotchi};
use crate::error::Result;

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum Outcome {
    Correct,
    Incorrect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Input {
    pub char: char,
    pub outcome: Outcome,
}

/// A word of the prompt that the player has moved past.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypedWord {
    pub text: String,
    /// Every keystroke of the word and its trailing separator was right.
    pub correct: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keystroke {
    pub outcome: Outcome,
    pub word: Option<TypedWord>,
    pub finished: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub keystroke: Keystroke,
    pub feeding: Option<FeedingResult>,
}

#[derive(Debug, Clone)]
pub struct PracticeRound {
    prompt: Vec<char>,
    input: Vec<Input>,
    word_start: usize,
}

impl PracticeRound {
    pub fn new(prompt: &str) -> Self {
        Self {
            prompt: prompt.trim().chars().collect(),
            input: Vec::new(),
            word_start: 0,
        }
    }

    pub fn prompt(&self) -> String {
        self.prompt.iter().collect()
    }

    pub fn input(&self) -> &[Input] {
        &self.input
    }

    pub fn expected_char(&self, idx: usize) -> Option<char> {
        self.prompt.get(idx).copied()
    }

    pub fn has_finished(&self) -> bool {
        self.input.len() >= self.prompt.len()
    }

    /// Type one character. Returns `None` once the prompt is complete.
    pub fn write(&mut self, c: char) -> Option<Keystroke> {
        let idx = self.input.len();
        let expected = self.expected_char(idx)?;
        let outcome = if c == expected {
            Outcome::Correct
        } else {
            Outcome::Incorrect
        };
        self.input.push(Input { char: c, outcome });

        let finished = self.has_finished();
        let word = if expected == ' ' {
            self.close_word(idx)
        } else if finished {
            self.close_word(idx + 1)
        } else {
            None
        };
        Some(Keystroke {
            outcome,
            word,
            finished,
        })
    }

    fn close_word(&mut self, end: usize) -> Option<TypedWord> {
        let start = self.word_start;
        self.word_start = self.input.len();
        if start >= end {
            return None;
        }
        Some(TypedWord {
            text: self.prompt[start..end].iter().collect(),
            correct: self.input[start..]
                .iter()
                .all(|i| i.outcome == Outcome::Correct),
        })
    }

    /// Undo the last keystroke of the current word. Words already fed stay fed.
    pub fn backspace(&mut self) -> bool {
        if self.input.len() > self.word_start {
            self.input.pop();
            true
        } else {
            false
        }
    }

    /// Type `c`, recording the keystroke in the active session and feeding any word it completes.
    pub fn press<C: Clock>(
        &mut self,
        engine: &mut Typingotchi<C>,
        c: char,
        timestamp_ms: i64,
    ) -> Result<Option<Step>> {
        let Some(expected) = self.expected_char(self.input.len()) else {
            return Ok(None);
        };
        engine.record_keypress(c, c == expected, timestamp_ms)?;

        let Some(keystroke) = self.write(c) else {
            return Ok(None);
        };
        let feeding = keystroke
            .word
            .as_ref()
            .map(|word| engine.feed(&word.text, word.correct));
        Ok(Some(Step { keystroke, feeding }))
    }
}
