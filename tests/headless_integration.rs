use std::sync::mpsc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use typingotchi::clock::{Clock, ManualClock};
use typingotchi::config::EngineConfig;
use typingotchi::content::ContentItem;
use typingotchi::practice::PracticeRound;
use typingotchi::runtime::{key_action, Action, ChannelEventSource, PracticeEvent, Runner};
use typingotchi::Typingotchi;

// Drives a full practice round through the runtime without a TTY: keys go through the
// channel event source, the round feeds the pet and the session ends when the prompt is done.
#[test]
fn headless_practice_round_completes() {
    let clock = ManualClock::new(1_700_000_000_000);
    let mut engine = Typingotchi::in_memory(EngineConfig::default(), clock.clone());
    let content = ContentItem::new("t", "hi cat", "animals");
    let mut round = PracticeRound::new(&content.text);
    engine.start_session(&content).unwrap();

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(ChannelEventSource::new(rx), Duration::from_millis(5));
    for c in "hi cat".chars() {
        tx.send(PracticeEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)))
            .unwrap();
    }

    let mut summary = None;
    for _ in 0..100u32 {
        match runner.step() {
            PracticeEvent::Tick | PracticeEvent::Resize => {}
            PracticeEvent::Key(key) => {
                if let Some(Action::Type(c)) = key_action(&key) {
                    clock.advance(250);
                    let step = round.press(&mut engine, c, clock.now_ms()).unwrap().unwrap();
                    if step.keystroke.finished {
                        summary = Some(engine.end_session().unwrap());
                        break;
                    }
                }
            }
        }
    }

    let summary = summary.expect("round should finish");
    assert_eq!(summary.total_chars, 6);
    assert_eq!(summary.accuracy_pct, 100.0);
    assert_eq!(engine.pet().words_fed_total, 2);
    assert_eq!(engine.progress().total_sessions, 1);
    assert!(engine.next_celebration().is_some());
}
