//! Terminal inspector: a live table over the traffic log.
//!
//! # Responsibilities
//! - Poll the traffic log once a second and render the exchange table
//! - Filter entry mode with cursor editing and inline parse errors
//! - Details pane for the selected exchange
//!
//! # Key Bindings
//! - `f` edit the filter, `Enter` apply, `Esc` cancel, `c` clear
//! - arrows / `j`/`k` move the selection, `Enter` open details
//! - `q` / Ctrl-C quit

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table, TableState, Wrap};
use ratatui::{DefaultTerminal, Frame};

use crate::traffic::log::LogEntry;
use crate::traffic::{self, Filter, TrafficLog};

const REFRESH_INTERVAL: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Static facts shown in the header lines.
#[derive(Debug, Clone)]
pub struct TuiOptions {
    pub app_url: String,
    /// `None` when the web inspector is disabled.
    pub inspector_url: Option<String>,
}

/// Run the TUI on the current thread until the user quits.
pub fn run(traffic: Arc<TrafficLog>, options: TuiOptions) -> io::Result<()> {
    let mut terminal = ratatui::init();
    let result = App::new(traffic, options).run(&mut terminal);
    ratatui::restore();
    result
}

struct App {
    traffic: Arc<TrafficLog>,
    options: TuiOptions,
    entries: Vec<LogEntry>,
    table_state: TableState,
    filters: Vec<Filter>,
    filter_mode: bool,
    filter_query: String,
    cursor: usize,
    filter_error: Option<String>,
    show_details: bool,
}

impl App {
    fn new(traffic: Arc<TrafficLog>, options: TuiOptions) -> Self {
        Self {
            traffic,
            options,
            entries: Vec::new(),
            table_state: TableState::default(),
            filters: Vec::new(),
            filter_mode: false,
            filter_query: String::new(),
            cursor: 0,
            filter_error: None,
            show_details: false,
        }
    }

    fn run(mut self, terminal: &mut DefaultTerminal) -> io::Result<()> {
        self.refresh();
        let mut last_refresh = Instant::now();

        loop {
            terminal.draw(|frame| self.draw(frame))?;

            if event::poll(POLL_INTERVAL)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key(key) {
                        return Ok(());
                    }
                }
            }

            if last_refresh.elapsed() >= REFRESH_INTERVAL {
                self.refresh();
                last_refresh = Instant::now();
            }
        }
    }

    fn refresh(&mut self) {
        self.entries = self.traffic.filtered(&self.filters);

        match self.table_state.selected() {
            Some(i) if i >= self.entries.len() => {
                self.table_state
                    .select(self.entries.len().checked_sub(1));
            }
            None if !self.entries.is_empty() => self.table_state.select(Some(0)),
            _ => {}
        }
    }

    /// Returns true when the app should quit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if self.filter_mode {
            self.handle_filter_key(key);
            return false;
        }

        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
            KeyCode::Char('f') => {
                self.filter_mode = true;
                self.filter_error = None;
                self.filter_query = traffic::format_query(&self.filters);
                self.cursor = self.filter_query.len();
            }
            KeyCode::Char('c') => {
                self.filters.clear();
                self.filter_query.clear();
                self.filter_error = None;
                self.refresh();
            }
            KeyCode::Up | KeyCode::Char('k') => self.select_previous(),
            KeyCode::Down | KeyCode::Char('j') => self.select_next(),
            KeyCode::Enter => {
                if self.selected_entry().is_some() {
                    self.show_details = !self.show_details;
                }
            }
            KeyCode::Esc => self.show_details = false,
            _ => {}
        }
        false
    }

    fn handle_filter_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.filter_mode = false;
                self.filter_query.clear();
                self.cursor = 0;
                self.filter_error = None;
            }
            KeyCode::Enter => match traffic::parse_query(&self.filter_query) {
                Ok(filters) => {
                    self.filters = filters;
                    self.filter_mode = false;
                    self.filter_error = None;
                    self.cursor = 0;
                    self.refresh();
                }
                Err(err) => self.filter_error = Some(err.to_string()),
            },
            KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Right => self.cursor = (self.cursor + 1).min(self.filter_query.len()),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.filter_query.len(),
            KeyCode::Char('a') if key.modifiers.contains(KeyModifiers::CONTROL) => self.cursor = 0,
            KeyCode::Char('e') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.cursor = self.filter_query.len()
            }
            KeyCode::Backspace => {
                if self.cursor > 0 {
                    self.filter_query.remove(self.cursor - 1);
                    self.cursor -= 1;
                }
            }
            KeyCode::Delete => {
                if self.cursor < self.filter_query.len() {
                    self.filter_query.remove(self.cursor);
                }
            }
            KeyCode::Char(c) if c.is_ascii() && !c.is_control() => {
                self.filter_query.insert(self.cursor, c);
                self.cursor += 1;
            }
            _ => {}
        }
    }

    fn selected_entry(&self) -> Option<&LogEntry> {
        self.table_state.selected().and_then(|i| self.entries.get(i))
    }

    fn select_next(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let next = match self.table_state.selected() {
            Some(i) => (i + 1).min(self.entries.len() - 1),
            None => 0,
        };
        self.table_state.select(Some(next));
    }

    fn select_previous(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let previous = self.table_state.selected().map_or(0, |i| i.saturating_sub(1));
        self.table_state.select(Some(previous));
    }

    fn draw(&mut self, frame: &mut Frame) {
        let [url_area, inspector_area, main_area, status_area] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        let url_line = Paragraph::new(format!("Bore URL: {}", self.options.app_url))
            .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
            .centered();
        frame.render_widget(url_line, url_area);

        let inspector_text = match &self.options.inspector_url {
            Some(url) => format!("Web Inspector URL: {url}"),
            None => "Web Inspector disabled".to_string(),
        };
        let inspector_line = Paragraph::new(inspector_text)
            .style(Style::default().fg(Color::LightBlue).add_modifier(Modifier::BOLD))
            .centered();
        frame.render_widget(inspector_line, inspector_area);

        if self.show_details {
            if let Some(entry) = self.selected_entry() {
                let details = Paragraph::new(detail_lines(entry))
                    .wrap(Wrap { trim: false })
                    .block(
                        Block::default()
                            .borders(Borders::ALL)
                            .title("Details (Esc to close)"),
                    );
                frame.render_widget(details, main_area);
            } else {
                self.show_details = false;
            }
        }

        if !self.show_details {
            let header = Row::new(["Method", "URI", "Status", "Content-Type", "Size", "Time (ms)"])
                .style(Style::default().add_modifier(Modifier::BOLD));

            let rows: Vec<Row> = self
                .entries
                .iter()
                .map(|entry| Row::new(entry_cells(entry).to_vec()))
                .collect();

            let table = Table::new(
                rows,
                [
                    Constraint::Percentage(8),
                    Constraint::Percentage(36),
                    Constraint::Percentage(8),
                    Constraint::Percentage(20),
                    Constraint::Percentage(10),
                    Constraint::Percentage(18),
                ],
            )
            .header(header)
            .block(Block::default().borders(Borders::ALL))
            .row_highlight_style(
                Style::default()
                    .bg(Color::Indexed(57))
                    .fg(Color::Indexed(229)),
            );

            frame.render_stateful_widget(table, main_area, &mut self.table_state);
        }

        frame.render_widget(self.status_line(), status_area);
    }

    fn status_line(&self) -> Paragraph<'_> {
        if self.filter_mode {
            let mut query = self.filter_query.clone();
            query.insert(self.cursor.min(query.len()), '_');

            return Paragraph::new(Line::from(vec![
                Span::styled(
                    "Ex: method:GET path:/api status:>=200 | ",
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(
                    format!("Filter: {query} "),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ),
                Span::styled("| Enter:apply Esc:cancel", Style::default().fg(Color::Yellow)),
            ]))
            .centered();
        }

        if let Some(err) = &self.filter_error {
            return Paragraph::new(Line::from(vec![
                Span::styled(format!("Error: {err}"), Style::default().fg(Color::Red)),
                Span::styled(" | Press 'f' to retry", Style::default().fg(Color::DarkGray)),
            ]))
            .centered();
        }

        let mut help = String::from("f:filter");
        if !self.filters.is_empty() {
            help.push_str(" | Active: ");
            help.push_str(&traffic::format_query(&self.filters));
        }
        help.push_str(" | c:clear | Enter:details | q:quit");

        Paragraph::new(help)
            .style(Style::default().fg(Color::DarkGray))
            .centered()
    }
}

fn entry_cells(entry: &LogEntry) -> [String; 6] {
    let (method, uri) = entry
        .request
        .as_ref()
        .map(|req| (req.method.clone(), req.path.clone()))
        .unwrap_or_default();

    let (status, content_type, size) = entry
        .response
        .as_ref()
        .map(|res| {
            (
                res.status_code.to_string(),
                res.content_type().unwrap_or_default().to_string(),
                format_size(res.body.len()),
            )
        })
        .unwrap_or_default();

    [
        method,
        uri,
        status,
        content_type,
        size,
        entry.duration_ms.to_string(),
    ]
}

fn detail_lines(entry: &LogEntry) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    lines.push(Line::from(Span::styled(
        format!("Request {}", entry.request_id),
        Style::default().add_modifier(Modifier::BOLD),
    )));

    if let Some(req) = &entry.request {
        lines.push(Line::from(format!("{} {}", req.method, req.path)));
        for (name, value) in &req.headers {
            lines.push(Line::from(format!("  {name}: {value}")));
        }
        if !req.body.is_empty() {
            lines.push(Line::from(String::from_utf8_lossy(&req.body).into_owned()));
        }
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Response",
        Style::default().add_modifier(Modifier::BOLD),
    )));

    match &entry.response {
        Some(res) => {
            lines.push(Line::from(format!(
                "{} in {} ms",
                res.status_code, entry.duration_ms
            )));
            for (name, value) in &res.headers {
                lines.push(Line::from(format!("  {name}: {value}")));
            }
            if !res.body.is_empty() {
                lines.push(Line::from(String::from_utf8_lossy(&res.body).into_owned()));
            }
        }
        None => lines.push(Line::from("(pending)")),
    }

    lines
}

fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::log::{LoggedRequest, LoggedResponse};
    use std::collections::HashMap;

    #[test]
    fn test_format_size_breakpoints() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_entry_cells_cover_both_halves() {
        let entry = LogEntry {
            request_id: "r".to_string(),
            request: Some(LoggedRequest {
                method: "GET".to_string(),
                path: "/ping".to_string(),
                headers: HashMap::new(),
                body: Vec::new(),
                timestamp: 0,
            }),
            response: Some(LoggedResponse {
                status_code: 200,
                headers: HashMap::from([(
                    "Content-Type".to_string(),
                    "text/plain".to_string(),
                )]),
                body: b"pong".to_vec(),
                timestamp: 12,
            }),
            duration_ms: 12,
        };

        let cells = entry_cells(&entry);
        assert_eq!(cells[0], "GET");
        assert_eq!(cells[1], "/ping");
        assert_eq!(cells[2], "200");
        assert_eq!(cells[3], "text/plain");
        assert_eq!(cells[4], "4 B");
        assert_eq!(cells[5], "12");
    }

    #[test]
    fn test_entry_cells_with_pending_response() {
        let entry = LogEntry {
            request_id: "r".to_string(),
            request: Some(LoggedRequest {
                method: "POST".to_string(),
                path: "/x".to_string(),
                headers: HashMap::new(),
                body: Vec::new(),
                timestamp: 0,
            }),
            response: None,
            duration_ms: 0,
        };

        let cells = entry_cells(&entry);
        assert_eq!(cells[0], "POST");
        assert_eq!(cells[2], "");
        assert_eq!(cells[4], "");
    }
}
