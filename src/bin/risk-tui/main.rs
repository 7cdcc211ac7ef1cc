mod app;

use std::io;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use app::{format_edge, format_money, format_pct, truncate, AppState, ConnectionStatus, KeyAction, PickRow};
use statsedge::config::edge_thresholds;

/// Poll the API this often when no key is pressed.
const AUTO_REFRESH: Duration = Duration::from_secs(10);

type Term = Terminal<CrosstermBackend<io::Stdout>>;

#[tokio::main]
async fn main() -> io::Result<()> {
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
    let access_token = std::env::var("ACCESS_TOKEN").ok().filter(|t| !t.trim().is_empty());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(io::Error::other)?;

    let mut app = AppState::new(base_url, access_token);
    app.refresh(&client).await;

    let mut screen = Screen::enter()?;
    run_loop(&mut screen.terminal, &mut app, &client).await
}

/// Raw mode + alternate screen for as long as this value lives.
struct Screen {
    terminal: Term,
}

impl Screen {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        Ok(Self {
            terminal: Terminal::new(CrosstermBackend::new(stdout))?,
        })
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

async fn run_loop(terminal: &mut Term, app: &mut AppState, client: &reqwest::Client) -> io::Result<()> {
    let mut last_refresh = Instant::now();

    loop {
        terminal.draw(|f| render(f, app))?;

        let wait = AUTO_REFRESH.saturating_sub(last_refresh.elapsed());
        let mut refresh = wait.is_zero();

        if !refresh && event::poll(wait)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match app.handle_key(key.code) {
                        KeyAction::Quit => return Ok(()),
                        KeyAction::Refresh => refresh = true,
                        KeyAction::Redraw => {}
                    }
                }
            }
        }

        if refresh {
            app.refresh(client).await;
            last_refresh = Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn panel(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            title,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))
}

fn render(f: &mut Frame, app: &AppState) {
    let [header, body, footer] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(f.area());
    let [feed, calculator] =
        Layout::horizontal([Constraint::Percentage(55), Constraint::Percentage(45)]).areas(body);

    render_status(f, app, header);
    render_feed(f, app, feed);
    render_calculator(f, app, calculator);
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(
            " q quit · r refresh · ↑↓/jk select · +/- bankroll · [/] kelly multiplier",
            Style::default().fg(Color::DarkGray),
        ))),
        footer,
    );
}

fn render_status(f: &mut Frame, app: &AppState, area: Rect) {
    let (status, color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };
    let realtime = match app.health.realtime_connected {
        Some(true) => "live",
        Some(false) => "polling",
        None => "?",
    };
    let details = format!(
        "  viewer {}  ·  {} picks  ·  server {} ({realtime})  ·  {} rejected rows",
        app.feed.viewer_tier.as_deref().unwrap_or("anonymous"),
        app.feed.picks.len(),
        app.health.status.as_deref().unwrap_or("?"),
        app.health.rejected_rows.unwrap_or(0),
    );

    let line = Line::from(vec![
        Span::styled(status, Style::default().fg(color)),
        Span::raw(details),
    ]);
    f.render_widget(Paragraph::new(line).block(panel(" StatsEdge risk ")), area);
}

fn edge_color(edge_percentage: f64) -> Color {
    match edge_percentage {
        e if e > edge_thresholds::ELITE => Color::Magenta,
        e if e > edge_thresholds::HIGH_CONFIDENCE => Color::Green,
        e if e > edge_thresholds::MEDIUM_CONFIDENCE => Color::Yellow,
        _ => Color::White,
    }
}

fn lock_label(p: &PickRow) -> &'static str {
    match (p.elite_locked, p.access.as_str()) {
        (true, _) => "ELITE",
        (false, "unlocked") => "",
        (false, "authentication_required") => "LOGIN",
        _ => "LOCK",
    }
}

fn render_feed(f: &mut Frame, app: &AppState, area: Rect) {
    let header = Row::new(["#", "Match", "Pick", "Odds", "Edge", "Conf", ""])
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

    let rows = app.feed.picks.iter().map(|p| {
        Row::new(vec![
            Cell::from((p.index + 1).to_string()),
            Cell::from(truncate(&p.match_label, 24)),
            Cell::from(truncate(&p.selection, 12)),
            Cell::from(format!("{:.2}", p.odds)),
            Cell::from(format_edge(p.edge_percentage))
                .style(Style::default().fg(edge_color(p.edge_percentage))),
            Cell::from(p.confidence.as_str()),
            Cell::from(lock_label(p)).style(Style::default().fg(Color::Red)),
        ])
    });

    let widths = [
        Constraint::Length(3),
        Constraint::Min(10),
        Constraint::Length(12),
        Constraint::Length(5),
        Constraint::Length(7),
        Constraint::Length(6),
        Constraint::Length(5),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .block(panel(" Value feed "))
        .row_highlight_style(Style::default().bg(Color::DarkGray));

    let mut state = TableState::default().with_selected(app.selected);
    f.render_stateful_widget(table, area, &mut state);
}

fn kv(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label:<16}"), Style::default().fg(Color::DarkGray)),
        Span::styled(value, Style::default().add_modifier(Modifier::BOLD)),
    ])
}

fn render_calculator(f: &mut Frame, app: &AppState, area: Rect) {
    let mut lines = vec![
        kv("Bankroll", format_money(app.calc.bankroll)),
        kv("Kelly multiplier", format!("{:.2}x", app.calc.kelly_multiplier)),
    ];
    if app.is_aggressive() {
        lines.push(Line::styled(
            "Aggressive: above full Kelly",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }
    lines.push(Line::default());

    if let Some((pick, rec)) = app.recommendation() {
        lines.push(Line::styled(
            format!("{} · {}", truncate(&pick.league_name, 20), truncate(&pick.match_label, 28)),
            Style::default().fg(Color::Cyan),
        ));
        lines.extend([
            kv("Odds", format!("{:.2}", rec.odds)),
            kv("Implied prob.", format_pct(rec.implied_probability)),
            kv("Model prob.", format_pct(rec.model_probability)),
            kv("Edge", format_edge(rec.edge_percent)),
            kv("Full Kelly", format_pct(rec.kelly_fraction)),
            kv("Stake fraction", format_pct(rec.recommended_fraction)),
        ]);
        lines.push(Line::default());
        lines.push(if rec.is_bet() {
            Line::styled(
                format!("STAKE {}", format_money(rec.recommended_stake)),
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            )
        } else {
            Line::styled("NO BET: no edge at this price", Style::default().fg(Color::DarkGray))
        });
        if pick.elite_locked {
            lines.push(Line::styled(
                "Deep analysis for this edge needs the Elite plan",
                Style::default().fg(Color::Magenta),
            ));
        }
    } else {
        lines.push(Line::styled("Select a pick", Style::default().fg(Color::DarkGray)));
    }

    f.render_widget(Paragraph::new(lines).block(panel(" Kelly calculator ")), area);
}
