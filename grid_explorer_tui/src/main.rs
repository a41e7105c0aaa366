use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use grid_explorer_core::{Algorithm, Episode, EpisodeConfig, ItemKind, Position, TerrainKind};
use ratatui::{
    crossterm::{
        self,
        event::{self, Event, KeyCode, KeyEventKind},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    collections::HashSet,
    hash::{DefaultHasher, Hash, Hasher},
    io::{self, Stdout},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    BestFirst,
    BreadthFirst,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::BestFirst => Algorithm::BestFirst,
            AlgorithmArg::BreadthFirst => Algorithm::BreadthFirst,
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Layout seed; anything that is not an integer is hashed into one
    seed: Option<String>,

    #[arg(long, default_value_t = 10)]
    width: usize,

    #[arg(long, default_value_t = 10)]
    height: usize,

    /// Item placement draws (repeated cells collapse)
    #[arg(long, default_value_t = 15)]
    items: usize,

    /// Starting score
    #[arg(long, default_value_t = 100)]
    score: i64,

    #[arg(long, value_enum, default_value_t = AlgorithmArg::BreadthFirst)]
    algorithm: AlgorithmArg,

    /// Algorithm to switch to on restart; defaults to --algorithm
    #[arg(long, value_enum)]
    restart_algorithm: Option<AlgorithmArg>,

    /// Milliseconds between simulation ticks
    #[arg(long, default_value_t = 150)]
    tick_ms: u64,

    /// Run without a terminal UI until the episode ends, then print a summary
    #[arg(long)]
    headless: bool,

    /// Tick limit for headless runs
    #[arg(long, default_value_t = 10_000)]
    max_ticks: u64,

    /// Directory for the log file
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

impl Args {
    fn episode_config(&self) -> EpisodeConfig {
        EpisodeConfig {
            width: self.width,
            height: self.height,
            item_draws: self.items,
            initial_score: self.score,
            algorithm: self.algorithm.into(),
            reset_algorithm: self.restart_algorithm.map(Into::into),
            ..EpisodeConfig::default()
        }
    }
}

/// Integers are used as-is (negatives keep their bit pattern); other strings are hashed.
fn parse_seed(raw: &str) -> u64 {
    if let Ok(seed) = raw.parse::<u64>() {
        return seed;
    }
    if let Ok(seed) = raw.parse::<i64>() {
        return seed as u64;
    }
    let mut hasher = DefaultHasher::new();
    raw.hash(&mut hasher);
    hasher.finish()
}

struct App {
    /// The core simulation.
    episode: Episode,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(episode: Episode) -> Self {
        App {
            episode,
            should_quit: false,
        }
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) {
        self.episode.step();
    }

    fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char(' ') => {
                let algorithm = self.episode.toggle_algorithm();
                tracing::info!(%algorithm, "algorithm switched");
            }
            KeyCode::Char('r') => self.episode.reset(None),
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = setup_logging(args.log_dir.as_deref().unwrap_or(&default_log_dir()))?;

    let seed = args.seed.as_deref().map(parse_seed);
    let episode =
        Episode::new(args.episode_config(), seed).context("invalid episode settings")?;
    tracing::info!(seed = episode.seed(), headless = args.headless, "starting");

    if args.headless {
        return run_headless(episode, args.max_ticks);
    }

    let mut terminal = setup_terminal()?;
    let mut app = App::new(episode);
    let result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));
    restore_terminal(&mut terminal)?;
    result
}

/// Logs go to a file only; the terminal belongs to the UI.
fn setup_logging(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::never(log_dir, "grid_explorer.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}

fn default_log_dir() -> PathBuf {
    let cache = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
        .unwrap_or_else(std::env::temp_dir);
    cache.join("grid_explorer").join("logs")
}

fn run_headless(mut episode: Episode, max_ticks: u64) -> Result<()> {
    while episode.outcome().is_none() && episode.ticks() < max_ticks {
        episode.step();
    }
    let outcome = match episode.outcome() {
        Some(outcome) => format!("{outcome:?}"),
        None => "unfinished".to_string(),
    };
    println!(
        "seed {} | {} | ticks {} | score {} | seen {}/{} | items left {}",
        episode.seed(),
        outcome,
        episode.ticks(),
        episode.score(),
        episode.coverage_count(),
        episode.config().cell_count(),
        episode.remaining_items(),
    );
    Ok(())
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code);
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(map_height(app.episode.height())),
            Constraint::Length(3),
            Constraint::Length(2),
        ])
        .split(frame.area());

    render_map(frame, main_layout[0], &app.episode);
    render_status(frame, main_layout[1], &app.episode);

    let help_text = Paragraph::new("Space: switch algorithm | r: restart | q/Esc: quit")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

/// Rows needed for the map: one per grid row plus the border, clamped to the terminal's range.
fn map_height(rows: usize) -> u16 {
    u16::try_from(rows).unwrap_or(u16::MAX).saturating_add(2)
}

/// Score, algorithm and end-of-game banner.
fn render_status(frame: &mut Frame, area: Rect, episode: &Episode) {
    let mut spans = vec![
        Span::raw(format!("Score: {}  ", episode.score())),
        Span::raw(format!("Algorithm: {}  ", episode.algorithm())),
        Span::raw(format!("Tick: {}  ", episode.ticks())),
        Span::raw(format!("Seed: {}  ", episode.seed())),
    ];
    if episode.is_over() {
        spans.push(Span::styled(
            "Game Over! Press 'r' to restart",
            Style::default().fg(Color::Red).bold(),
        ));
    } else if episode.is_won() {
        spans.push(Span::styled(
            "Grid cleared!",
            Style::default().fg(Color::Green).bold(),
        ));
    }

    let status = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("Status"));
    frame.render_widget(status, area);
}

/// Renders the fogged grid, items, planned route and agent.
fn render_map(frame: &mut Frame, area: Rect, episode: &Episode) {
    let route: HashSet<Position> = episode.planned_path().iter().copied().collect();
    let agent = episode.agent_position();
    let mut lines: Vec<Line> = Vec::with_capacity(episode.height());

    for y in 0..episode.height() {
        let mut spans: Vec<Span> = Vec::with_capacity(episode.width() * 2);
        for x in 0..episode.width() {
            let position = Position { x, y };
            let terrain = episode
                .terrain_view(position)
                .unwrap_or(TerrainKind::Unknown);
            let background = match terrain {
                TerrainKind::Normal => Color::Green,
                TerrainKind::Mud => Color::Rgb(139, 90, 43),
                TerrainKind::Water => Color::Blue,
                TerrainKind::Unknown => Color::Black,
            };
            let item = episode
                .is_visible(position)
                .then(|| episode.items().get(position))
                .flatten();

            let (glyph, foreground) = if position == agent && !episode.is_over() {
                ("@@", Color::Yellow)
            } else if let Some(kind) = item {
                match kind {
                    ItemKind::Positive => ("()", Color::LightGreen),
                    ItemKind::Negative => ("()", Color::LightRed),
                }
            } else if route.contains(&position) {
                ("..", Color::White)
            } else {
                ("  ", Color::Reset)
            };
            spans.push(Span::styled(
                glyph,
                Style::default().fg(foreground).bg(background).bold(),
            ));
        }
        lines.push(Line::from(spans));
    }

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Grid Explorer").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}
