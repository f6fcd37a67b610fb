use anyhow::Result;
use chrono::NaiveDate;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
};
use std::io::stdout;
use std::path::{Path, PathBuf};

use crate::db::SlotStorage;
use crate::display::{days_ago, format_date, truncate};
use crate::models::{ApplicationRecord, Stage, StageFilter};
use crate::store::ApplicationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Search,
    ConfirmDelete(i64),
}

struct BrowseState {
    chips: Vec<StageFilter>,
    chip: usize,
    search: String,
    mode: Mode,
    selected: usize,
    message: Option<String>,
    export_dir: PathBuf,
}

impl BrowseState {
    fn new(export_dir: &Path) -> Self {
        Self {
            chips: StageFilter::chips(),
            chip: 0,
            search: String::new(),
            mode: Mode::Normal,
            selected: 0,
            message: None,
            export_dir: export_dir.to_path_buf(),
        }
    }

    fn filter(&self) -> &StageFilter {
        &self.chips[self.chip]
    }

    fn visible<'a, S: SlotStorage>(&'a self, store: &'a ApplicationStore<S>) -> Vec<&'a ApplicationRecord> {
        store.query(self.filter(), &self.search).collect()
    }

    fn selected_id<S: SlotStorage>(&self, store: &ApplicationStore<S>) -> Option<i64> {
        self.visible(store).get(self.selected).map(|r| r.id)
    }

    fn next_chip(&mut self) {
        self.chip = (self.chip + 1) % self.chips.len();
        self.selected = 0;
    }

    fn prev_chip(&mut self) {
        self.chip = (self.chip + self.chips.len() - 1) % self.chips.len();
        self.selected = 0;
    }

    fn next(&mut self, len: usize) {
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
        }
    }

    fn prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Returns true when the user asked to quit.
    fn handle_key<S: SlotStorage>(
        &mut self,
        code: KeyCode,
        store: &mut ApplicationStore<S>,
        today: NaiveDate,
    ) -> bool {
        match self.mode {
            Mode::Search => match code {
                KeyCode::Enter | KeyCode::Esc => self.mode = Mode::Normal,
                KeyCode::Backspace => {
                    self.search.pop();
                    self.selected = 0;
                }
                KeyCode::Char(c) => {
                    self.search.push(c);
                    self.selected = 0;
                }
                _ => {}
            },
            Mode::ConfirmDelete(id) => {
                self.mode = Mode::Normal;
                if code == KeyCode::Char('y') {
                    self.message = Some(match store.remove(id) {
                        Ok(_) => "Application deleted successfully!".to_string(),
                        Err(e) => format!("Error: {} (data may not be saved)", e),
                    });
                } else {
                    self.message = Some("Delete cancelled.".to_string());
                }
                let len = self.visible(store).len();
                self.selected = self.selected.min(len.saturating_sub(1));
            }
            Mode::Normal => match code {
                KeyCode::Char('q') | KeyCode::Esc => return true,
                KeyCode::Down | KeyCode::Char('j') => {
                    let len = self.visible(store).len();
                    self.next(len);
                }
                KeyCode::Up | KeyCode::Char('k') => self.prev(),
                KeyCode::Tab => self.next_chip(),
                KeyCode::BackTab => self.prev_chip(),
                KeyCode::Char('/') => self.mode = Mode::Search,
                KeyCode::Char('c') => {
                    self.search.clear();
                    self.selected = 0;
                }
                KeyCode::Char('d') => {
                    if let Some(id) = self.selected_id(store) {
                        self.mode = Mode::ConfirmDelete(id);
                    }
                }
                KeyCode::Char('x') => {
                    self.message = Some(match store.export_to_dir(&self.export_dir, today) {
                        Ok(path) => format!("Data exported to {}", path.display()),
                        Err(e) => e.to_string(),
                    });
                }
                _ => {}
            },
        }
        false
    }
}

pub fn run_browse<S: SlotStorage>(store: &mut ApplicationStore<S>, export_dir: &Path) -> Result<()> {
    let mut state = BrowseState::new(export_dir);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, store);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop<S: SlotStorage>(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut BrowseState,
    store: &mut ApplicationStore<S>,
) -> Result<()> {
    let mut table_state = TableState::default();

    loop {
        let today = chrono::Local::now().date_naive();
        table_state.select(Some(state.selected));
        terminal.draw(|frame| draw(frame, state, store, today, &mut table_state))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if state.handle_key(key.code, store, today) {
                break;
            }
        }
    }
    Ok(())
}

fn draw<S: SlotStorage>(
    frame: &mut Frame,
    state: &BrowseState,
    store: &ApplicationStore<S>,
    today: NaiveDate,
    table_state: &mut TableState,
) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    // Summary cards
    let summary = store.summary();
    let cards = Paragraph::new(format!(
        " Total: {}   Interviews: {}   Offers: {}   Rejected: {}   Success rate: {}%",
        summary.total, summary.interviews, summary.offers, summary.rejected, summary.success_rate
    ))
    .block(Block::default().borders(Borders::ALL).title(" Placement Tracker "));
    frame.render_widget(cards, rows[0]);

    // Filter chips and search box
    let mut spans: Vec<Span> = Vec::new();
    for (i, chip) in state.chips.iter().enumerate() {
        let style = if i == state.chip {
            Style::default().bg(Color::Cyan).fg(Color::Black).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(format!(" {} ", chip.label()), style));
        spans.push(Span::raw(" "));
    }
    let cursor = if state.mode == Mode::Search { "_" } else { "" };
    spans.push(Span::raw(format!("  Search: {}{}", state.search, cursor)));
    let filters = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    frame.render_widget(filters, rows[1]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(rows[2]);

    let visible = state.visible(store);
    if visible.is_empty() {
        let text = if store.is_empty() {
            "No applications yet. Add your first one!"
        } else {
            "No matching applications found."
        };
        let empty = Paragraph::new(text)
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title(" Applications (0) "));
        frame.render_widget(empty, body[0]);
    } else {
        let table_rows: Vec<Row> = visible
            .iter()
            .map(|app| {
                Row::new(vec![
                    Cell::from(truncate(&app.company, 20)).style(Style::default().add_modifier(Modifier::BOLD)),
                    Cell::from(truncate(&app.role, 20)),
                    Cell::from(app.stage.as_str().to_string()).style(stage_style(&app.stage)),
                    Cell::from(app.result.clone()),
                    Cell::from(format_date(app.date)),
                    Cell::from(days_ago(app.date, today)),
                    Cell::from(truncate(&app.notes, 24)),
                ])
            })
            .collect();

        let widths = [
            Constraint::Length(20),
            Constraint::Length(20),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(13),
            Constraint::Length(12),
            Constraint::Min(10),
        ];
        let header = Row::new(vec!["Company", "Role", "Stage", "Result", "Date", "Age", "Notes"])
            .style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan));
        let table = Table::new(table_rows, widths)
            .header(header)
            .block(Block::default().borders(Borders::ALL).title(format!(
                " Applications ({}) ",
                visible.len()
            )))
            .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
            .highlight_symbol("> ");
        frame.render_stateful_widget(table, body[0], table_state);
    }

    let detail = Paragraph::new(build_detail(visible.get(state.selected).copied(), today))
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false });
    frame.render_widget(detail, body[1]);

    // Footer: pending confirmation, last message, or help
    let footer = match state.mode {
        Mode::ConfirmDelete(_) => Paragraph::new(" Are you sure you want to delete this application? (y/n)")
            .style(Style::default().fg(Color::Yellow)),
        _ => match &state.message {
            Some(msg) => Paragraph::new(format!(" {}", msg)).style(Style::default().fg(Color::Green)),
            None => Paragraph::new(
                " j/k:navigate  tab:filter  /:search  c:clear search  d:delete  x:export  q:quit",
            )
            .style(Style::default().fg(Color::DarkGray)),
        },
    };
    frame.render_widget(footer, rows[3]);
}

fn stage_style(stage: &Stage) -> Style {
    match stage {
        Stage::Applied => Style::default().fg(Color::Blue),
        Stage::Interview => Style::default().fg(Color::Yellow),
        Stage::Offer => Style::default().fg(Color::Green),
        Stage::Rejected => Style::default().fg(Color::Red),
        Stage::Other(_) => Style::default().fg(Color::Magenta),
    }
}

fn build_detail(app: Option<&ApplicationRecord>, today: NaiveDate) -> Text<'static> {
    let Some(app) = app else {
        return Text::raw("No application selected");
    };

    let mut lines: Vec<Line> = vec![
        Line::from(Span::styled(
            app.company.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(app.role.clone()),
        Line::from(""),
        Line::from(Span::styled(format!("Stage: {}", app.stage), stage_style(&app.stage))),
        Line::from(format!("Result: {}", app.result)),
        Line::from(format!("Applied: {} ({})", format_date(app.date), days_ago(app.date, today))),
        Line::from(format!("ID: {}", app.id)),
        Line::from(""),
    ];

    if app.has_notes() {
        lines.push(Line::from(Span::styled(
            "Notes",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in textwrap::fill(&app.notes, 30).lines() {
            lines.push(Line::from(line.to_string()));
        }
    } else {
        lines.push(Line::from(Span::styled(
            "(No notes)",
            Style::default().fg(Color::DarkGray),
        )));
    }

    Text::from(lines)
}
