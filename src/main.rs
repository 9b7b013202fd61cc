use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand, ValueEnum};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::File,
    io::{self, stdin},
    path::PathBuf,
    time::Duration,
};
use tracing_subscriber::EnvFilter;
use typingotchi::{
    app_dirs::AppDirs,
    clock::{Clock, SystemClock},
    config::{ConfigStore, FileConfigStore},
    content::{BuiltinContent, ContentItem, ContentProvider, Difficulty},
    engine::Typingotchi,
    export::write_history_csv,
    metrics,
    practice::PracticeRound,
    runtime::{key_action, Action, CrosstermEventSource, PracticeEvent, Runner},
    session::SessionSummary,
    time_series::{TimeSeriesPoint, TrendPoint},
    ui::{celebration_text, face, PracticeView},
};

const TICK_RATE_MS: u64 = 100;

/// typing practice with a virtual pet that grows as you type
#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cli {
    /// path of the state database
    #[clap(long)]
    db: Option<PathBuf>,

    /// path of the JSON config file
    #[clap(long)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// type a sentence and feed your pet (default)
    Practice {
        #[clap(short = 'd', long, value_enum)]
        difficulty: Option<DifficultyArg>,

        /// custom text to type instead of a built-in sentence
        #[clap(short = 'p', long)]
        prompt: Option<String>,
    },
    /// show the pet and overall progress
    Status,
    /// list achievements and whether they are unlocked
    Achievements,
    /// show recent sessions
    History {
        #[clap(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
    /// daily trend with moving average
    Trend {
        #[clap(value_enum, default_value_t = TrendMetric::Wpm)]
        metric: TrendMetric,
    },
    /// write session history as CSV to a file or stdout
    Export {
        #[clap(short = 'o', long)]
        output: Option<PathBuf>,
    },
    /// put on an unlocked accessory
    Equip { accessory: String },
    /// take an accessory off
    Unequip { accessory: String },
    /// keys you miss most often
    Keys,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum DifficultyArg {
    Easy,
    Medium,
    Hard,
}

impl From<DifficultyArg> for Difficulty {
    fn from(arg: DifficultyArg) -> Self {
        match arg {
            DifficultyArg::Easy => Difficulty::Easy,
            DifficultyArg::Medium => Difficulty::Medium,
            DifficultyArg::Hard => Difficulty::Hard,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum TrendMetric {
    Wpm,
    Accuracy,
    Time,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(err) = run(cli) {
        eprintln!("typingotchi: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config_store = match &cli.config {
        Some(path) => FileConfigStore::with_path(path),
        None => FileConfigStore::new(),
    };
    let config = config_store.load();
    let db = cli
        .db
        .clone()
        .or_else(AppDirs::db_path)
        .ok_or("could not determine where to keep the state database")?;
    let mut engine = Typingotchi::open_sqlite(&db, config)?;

    match cli.command.unwrap_or(Command::Practice {
        difficulty: None,
        prompt: None,
    }) {
        Command::Practice { difficulty, prompt } => {
            let content = match prompt {
                Some(text) => ContentItem::new("custom", text, "custom"),
                None => BuiltinContent::new()
                    .pick(difficulty.map(Difficulty::from))
                    .ok_or("no practice text available")?,
            };
            practice(&mut engine, content)?;
        }
        Command::Status => print_status(&engine),
        Command::Achievements => print_achievements(&engine),
        Command::History { limit } => print_history(&engine, limit),
        Command::Trend { metric } => {
            let points = match metric {
                TrendMetric::Wpm => engine.wpm_trend(),
                TrendMetric::Accuracy => engine.accuracy_trend(),
                TrendMetric::Time => engine.practice_time_trend(),
            };
            print_trend(&points);
        }
        Command::Export { output } => {
            let rows = match output {
                Some(path) => write_history_csv(engine.history(), File::create(path)?)?,
                None => write_history_csv(engine.history(), io::stdout().lock())?,
            };
            eprintln!("exported {rows} sessions");
        }
        Command::Equip { accessory } => match engine.equip_accessory(&accessory)? {
            Some(previous) => println!("swapped {previous} for {accessory}"),
            None => println!("now wearing {accessory}"),
        },
        Command::Unequip { accessory } => {
            if engine.unequip_accessory(&accessory)? {
                println!("took off {accessory}");
            } else {
                println!("{accessory} was not being worn");
            }
        }
        Command::Keys => print_keys(&engine),
    }

    engine.flush()?;
    Ok(())
}

fn practice(
    engine: &mut Typingotchi<SystemClock>,
    content: ContentItem,
) -> Result<(), Box<dyn Error>> {
    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_round(&mut terminal, engine, &content);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Some(summary) = result? {
        println!(
            "{:.0} wpm, {:.0}% accuracy{}",
            summary.wpm,
            summary.accuracy_pct,
            if summary.partial { " (cancelled)" } else { "" }
        );
    }
    Ok(())
}

struct Screen {
    round: PracticeRound,
    summary: Option<SessionSummary>,
    timeline: Vec<TimeSeriesPoint>,
}

fn draw<B: Backend>(
    terminal: &mut Terminal<B>,
    engine: &Typingotchi<SystemClock>,
    screen: &Screen,
) -> io::Result<()> {
    let view = PracticeView {
        round: &screen.round,
        pet: engine.pet(),
        mood: engine.mood(),
        celebration: engine.next_celebration(),
        summary: screen.summary.as_ref(),
        timeline: &screen.timeline,
    };
    terminal.draw(|f| f.render_widget(&view, f.area()))?;
    Ok(())
}

fn run_round<B: Backend>(
    terminal: &mut Terminal<B>,
    engine: &mut Typingotchi<SystemClock>,
    content: &ContentItem,
) -> Result<Option<SessionSummary>, Box<dyn Error>> {
    let clock = SystemClock;
    let runner = Runner::new(CrosstermEventSource::new(), Duration::from_millis(TICK_RATE_MS));
    let mut screen = Screen {
        round: PracticeRound::new(&content.text),
        summary: None,
        timeline: Vec::new(),
    };
    engine.start_session(content)?;

    loop {
        draw(terminal, engine, &screen)?;
        let key = match runner.step() {
            PracticeEvent::Key(key) => key,
            PracticeEvent::Resize | PracticeEvent::Tick => continue,
        };
        match key_action(&key) {
            Some(Action::Quit) => {
                if screen.summary.is_none() {
                    return Ok(engine.cancel_session());
                }
                return Ok(screen.summary);
            }
            Some(Action::Dismiss) => {
                if let Some(id) = engine.next_celebration().map(|e| e.id) {
                    engine.mark_shown(id);
                }
            }
            Some(Action::Backspace) if screen.summary.is_none() => {
                screen.round.backspace();
            }
            Some(Action::Type(c)) if screen.summary.is_none() => {
                let step = screen.round.press(engine, c, clock.now_ms())?;
                if step.is_some_and(|s| s.keystroke.finished) {
                    screen.timeline = engine
                        .current_session()
                        .map(|record| metrics::wpm_timeline(&record.keypresses))
                        .unwrap_or_default();
                    screen.summary = Some(engine.end_session()?);
                }
            }
            _ => {}
        }
    }
}

fn print_status(engine: &Typingotchi<SystemClock>) {
    let pet = engine.pet();
    let mood = engine.mood();
    println!("{} {} is {}", face(mood), pet.evolution_form, mood);
    println!("happiness    {:.0}/100", pet.happiness);
    let check = engine.evolution_check();
    match check.next_form {
        Some(next) => println!(
            "words fed    {} ({} more to become a {next})",
            pet.words_fed_total, check.words_remaining
        ),
        None => println!("words fed    {} (fully grown)", pet.words_fed_total),
    }
    for (category, accessory) in &pet.accessories_equipped {
        println!("{:<12} {accessory}", category.to_string().to_lowercase());
    }

    let progress = engine.progress();
    println!();
    println!("sessions     {}", progress.total_sessions);
    println!("words typed  {}", progress.total_words);
    println!("practice     {} min", progress.practice_minutes());
    println!("streak       {} days", progress.streak_days);
    println!("best wpm     {:.0}", progress.best_wpm);

    let pending = engine.pending_celebrations();
    if let Some(event) = engine.next_celebration() {
        println!();
        println!("{} ({pending} waiting)", celebration_text(event));
    }
}

fn print_achievements(engine: &Typingotchi<SystemClock>) {
    for achievement in engine.achievements() {
        let mark = if achievement.unlocked { "[x]" } else { "[ ]" };
        let reward = achievement
            .reward
            .map(|r| format!("  -> {r}"))
            .unwrap_or_default();
        println!(
            "{mark} {:<16} {:<11} {}{reward}",
            achievement.name, achievement.category, achievement.description
        );
    }
    let unlocked: Vec<&str> = engine.unlocked_accessories().iter().map(|a| a.id).collect();
    if !unlocked.is_empty() {
        println!();
        println!("accessories: {}", unlocked.join(", "));
    }
}

fn print_history(engine: &Typingotchi<SystemClock>, limit: usize) {
    for s in engine.history().iter().rev().take(limit) {
        println!(
            "{}  {:>5.1} wpm  {:>5.1}%  {:>4}s  {}{}",
            s.started_at.format("%Y-%m-%d %H:%M"),
            s.wpm,
            s.accuracy_pct,
            s.duration_ms / 1000,
            s.content_id,
            if s.partial { " (partial)" } else { "" }
        );
    }
}

fn print_trend(points: &[TrendPoint]) {
    if points.is_empty() {
        println!("no sessions yet");
    }
    for p in points {
        println!("{}  {:>6.1}  avg {:>6.1}", p.date, p.value, p.moving_average);
    }
}

fn print_keys(engine: &Typingotchi<SystemClock>) {
    let keys = engine.challenging_keys();
    if keys.is_empty() {
        println!("no trouble keys yet");
    }
    for (key, rate) in keys {
        println!(
            "'{key}'  {:>5.1}% missed  ({} of {})",
            rate.error_rate() * 100.0,
            rate.errors,
            rate.attempts
        );
    }
}
