//! Live dashboard for a running check

use crate::proxy::{ProgressSnapshot, ResultAggregator};
use crate::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Proxy checker dashboard state
pub struct ProxyCheckerApp {
    aggregator: Arc<ResultAggregator>,
    /// Fired to stop admitting new proxies
    cancel: CancellationToken,
    /// Fired by the caller once the run has returned
    done: CancellationToken,
    refresh: Duration,
    snapshot: ProgressSnapshot,
    /// Selected list (0 = working, 1 = failed)
    selected_list: usize,
    list_state: ListState,
    status_message: String,
    should_quit: bool,
}

impl ProxyCheckerApp {
    pub fn new(
        aggregator: Arc<ResultAggregator>,
        cancel: CancellationToken,
        done: CancellationToken,
        refresh: Duration,
    ) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            aggregator,
            cancel,
            done,
            refresh,
            snapshot: ProgressSnapshot::default(),
            selected_list: 0,
            list_state,
            status_message: "Checking proxies... Press 'q' to stop.".to_string(),
            should_quit: false,
        }
    }

    /// Run the dashboard until the check is done and the user quits
    pub async fn run(&mut self) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e.into());
        }
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = match Terminal::new(backend) {
            Ok(terminal) => terminal,
            Err(e) => {
                let _ = disable_raw_mode();
                let _ = execute!(io::stdout(), LeaveAlternateScreen);
                return Err(e.into());
            }
        };

        let result = self.run_app(&mut terminal).await;

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn is_complete(&self) -> bool {
        self.done.is_cancelled()
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        loop {
            self.snapshot = self.aggregator.snapshot();
            self.update_status();
            terminal.draw(|f| self.ui(f))?;

            if event::poll(self.refresh)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_input(key.code, key.modifiers);
                    }
                }
            }

            if self.should_quit {
                break;
            }
            tokio::task::yield_now().await;
        }

        Ok(())
    }

    fn update_status(&mut self) {
        let s = &self.snapshot;
        self.status_message = if self.is_complete() {
            format!(
                "Complete! Checked: {} | Working: {} | Failed: {} | Press 'q' to quit",
                s.completed, s.working, s.failed
            )
        } else if self.cancel.is_cancelled() {
            format!(
                "Stopping... waiting for {} in-flight checks | Working: {} | Failed: {}",
                s.in_flight, s.working, s.failed
            )
        } else {
            format!(
                "Checking... {:.0}% ({}/{}) | Active: {} | Working: {} | Failed: {}",
                s.percent(),
                s.completed,
                s.total,
                s.in_flight,
                s.working,
                s.failed
            )
        };
    }

    fn handle_input(&mut self, key: KeyCode, modifiers: KeyModifiers) {
        match key {
            // Raw mode turns Ctrl-C into a key press instead of SIGINT.
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => self.stop_or_quit(),
            KeyCode::Char('q') | KeyCode::Esc => self.stop_or_quit(),
            KeyCode::Tab => {
                self.selected_list = (self.selected_list + 1) % 2;
                self.list_state.select(Some(0));
            }
            KeyCode::Down => {
                let len = self.selected_len();
                let i = match self.list_state.selected() {
                    Some(i) if i + 1 < len => i + 1,
                    _ => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up => {
                let len = self.selected_len();
                let i = match self.list_state.selected() {
                    Some(0) | None => len.saturating_sub(1),
                    Some(i) => i - 1,
                };
                self.list_state.select(Some(i));
            }
            _ => {}
        }
    }

    /// Stop admitting while the run is going; leave once it is done
    fn stop_or_quit(&mut self) {
        if self.is_complete() {
            self.should_quit = true;
        } else {
            self.cancel.cancel();
        }
    }

    fn selected_len(&self) -> usize {
        if self.selected_list == 0 {
            self.snapshot.recent_working.len()
        } else {
            self.snapshot.recent_failed.len()
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Title
                Constraint::Length(3), // Progress bar
                Constraint::Min(0),    // Proxy lists
                Constraint::Length(3), // Status bar
            ])
            .split(f.size());

        let title = Paragraph::new("Proxy Checker")
            .style(Style::default().fg(Color::Cyan))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        let percent = self.snapshot.percent().clamp(0.0, 100.0) as u16;
        let progress_label = format!(
            "{}/{} ({}%) - active {}",
            self.snapshot.completed, self.snapshot.total, percent, self.snapshot.in_flight
        );
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .percent(percent)
            .label(progress_label);
        f.render_widget(gauge, chunks[1]);

        let proxy_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[2]);

        // Newest first
        let working: Vec<String> = self
            .snapshot
            .recent_working
            .iter()
            .rev()
            .map(|w| match &w.metadata {
                Some(meta) => format!("{} ({})", w.address, meta),
                None => w.address.to_string(),
            })
            .collect();
        let failed: Vec<String> = self
            .snapshot
            .recent_failed
            .iter()
            .rev()
            .map(|(address, kind)| format!("{address} ({kind})"))
            .collect();

        render_list(
            f,
            proxy_chunks[0],
            "Working",
            &working,
            self.snapshot.working,
            Color::Green,
            (self.selected_list == 0).then_some(&mut self.list_state),
        );
        render_list(
            f,
            proxy_chunks[1],
            "Failed",
            &failed,
            self.snapshot.failed,
            Color::Red,
            (self.selected_list == 1).then_some(&mut self.list_state),
        );

        let status = Paragraph::new(self.status_message.clone())
            .style(if self.is_complete() {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Yellow)
            })
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[3]);
    }
}

fn render_list(
    f: &mut Frame,
    area: Rect,
    title: &str,
    lines: &[String],
    total_count: usize,
    color: Color,
    list_state: Option<&mut ListState>,
) {
    let items: Vec<ListItem> = lines
        .iter()
        .map(|line| ListItem::new(line.as_str()).style(Style::default().fg(color)))
        .collect();

    let border_style = if list_state.is_some() {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{title} ({total_count})"))
                .border_style(border_style),
        )
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol(">> ");

    if let Some(state) = list_state {
        f.render_stateful_widget(list, area, state);
    } else {
        f.render_widget(list, area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProbeOutcome;
    use ratatui::backend::TestBackend;

    fn app(agg: Arc<ResultAggregator>) -> ProxyCheckerApp {
        ProxyCheckerApp::new(
            agg,
            CancellationToken::new(),
            CancellationToken::new(),
            Duration::from_millis(10),
        )
    }

    #[test]
    fn test_quit_before_completion_only_cancels() {
        let mut app = app(Arc::new(ResultAggregator::new()));
        app.handle_input(KeyCode::Char('q'), KeyModifiers::NONE);
        assert!(app.cancel.is_cancelled());
        assert!(!app.should_quit);

        app.done.cancel();
        app.handle_input(KeyCode::Char('q'), KeyModifiers::NONE);
        assert!(app.should_quit);
    }

    #[test]
    fn test_ctrl_c_cancels_then_quits() {
        let mut app = app(Arc::new(ResultAggregator::new()));
        app.handle_input(KeyCode::Char('c'), KeyModifiers::NONE);
        assert!(!app.cancel.is_cancelled());

        app.handle_input(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(app.cancel.is_cancelled());
        assert!(!app.should_quit);

        app.done.cancel();
        app.handle_input(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(app.should_quit);
    }

    #[test]
    fn test_list_navigation_wraps() {
        let agg = Arc::new(ResultAggregator::new());
        agg.record("http://a:1".into(), ProbeOutcome::success(None), 1);
        agg.record("http://b:1".into(), ProbeOutcome::success(None), 1);
        let mut app = app(agg);
        app.snapshot = app.aggregator.snapshot();

        app.handle_input(KeyCode::Down, KeyModifiers::NONE);
        assert_eq!(app.list_state.selected(), Some(1));
        app.handle_input(KeyCode::Down, KeyModifiers::NONE);
        assert_eq!(app.list_state.selected(), Some(0));
        app.handle_input(KeyCode::Up, KeyModifiers::NONE);
        assert_eq!(app.list_state.selected(), Some(1));
    }

    #[test]
    fn test_draws_snapshot() {
        let agg = Arc::new(ResultAggregator::new());
        agg.set_total(2);
        agg.record("http://good:1".into(), ProbeOutcome::success(None), 1);
        let mut app = app(agg);
        app.snapshot = app.aggregator.snapshot();
        app.update_status();

        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal.draw(|f| app.ui(f)).unwrap();
        let rendered = format!("{:?}", terminal.backend().buffer());
        assert!(rendered.contains("http://good:1"));
        assert!(rendered.contains("Working (1)"));
    }
}
