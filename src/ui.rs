use anyhow::Result;
use apartment_locator::search::NO_MATCH_NOTICE;
use apartment_locator::{
    Config, LocatorError, LocatorSession, Marker, MarkerBoard, MarkerKind, RecordSource, SharedRestore,
};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Points},
        Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap,
    },
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Half-width of the map view, in degrees
const MAP_SPAN_LNG: f64 = 0.03;
const MAP_SPAN_LAT: f64 = 0.02;

/// Results of background work, drained by the UI loop
enum UiEvent {
    Loaded(Result<usize, LocatorError>),
    Restored(Result<Option<SharedRestore>, LocatorError>),
}

#[derive(Debug, Clone)]
pub enum Notice {
    /// Blocking: the next key only dismisses it
    Alert(String),
    Info(String),
}

pub struct App {
    pub session: LocatorSession<MarkerBoard>,
    pub input: String,
    pub notice: Option<Notice>,
    pub list_state: ListState,
    source: Arc<dyn RecordSource>,
    config: Config,
    runtime: Handle,
    events_tx: UnboundedSender<UiEvent>,
    events_rx: UnboundedReceiver<UiEvent>,
}

impl App {
    pub fn new(
        session: LocatorSession<MarkerBoard>,
        source: Arc<dyn RecordSource>,
        config: Config,
        runtime: Handle,
    ) -> Self {
        let (events_tx, events_rx) = unbounded_channel();

        Self {
            session,
            input: String::new(),
            notice: None,
            list_state: ListState::default(),
            source,
            config,
            runtime,
            events_tx,
            events_rx,
        }
    }

    /// Kick off landmarks, the first load and the share-link replay
    pub fn start(&mut self, shared_url: Option<String>) {
        let session = self.session.clone();
        let palais = apartment_locator::Coordinate::new(self.config.map.center_lat, self.config.map.center_lng);
        let agency = self.config.map.agency_address.clone();
        self.runtime.spawn(async move {
            session.place_landmarks(palais, &agency).await;
        });

        self.reload();

        if let Some(url) = shared_url {
            let session = self.session.clone();
            let tx = self.events_tx.clone();
            self.runtime.spawn(async move {
                let restored = session.restore_shared_link(&url).await;
                let _ = tx.send(UiEvent::Restored(restored));
            });
        }
    }

    pub fn reload(&mut self) {
        let session = self.session.clone();
        let source = Arc::clone(&self.source);
        let tx = self.events_tx.clone();
        self.runtime.spawn(async move {
            let loaded = session.load_records(source.as_ref()).await;
            let _ = tx.send(UiEvent::Loaded(loaded));
        });
        self.notice = Some(Notice::Info("Chargement des données...".to_string()));
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                UiEvent::Loaded(Ok(count)) => {
                    self.notice = Some(Notice::Info(format!("{} appartements chargés", count)));
                }
                UiEvent::Loaded(Err(e)) => self.notice = Some(Notice::Alert(e.to_string())),
                UiEvent::Restored(Ok(Some(restored))) => {
                    self.input = restored.input;
                    self.report_search(restored.report.outcome.matched.len());
                }
                UiEvent::Restored(Ok(None)) => {}
                UiEvent::Restored(Err(e)) => self.notice = Some(Notice::Alert(e.to_string())),
            }
        }
    }

    pub fn search(&mut self) {
        // search spawns geocode tasks onto the runtime
        let _guard = self.runtime.enter();

        match self.session.search(&self.input) {
            Ok(report) => self.report_search(report.outcome.matched.len()),
            Err(e) => self.notice = Some(Notice::Alert(e.to_string())),
        }
    }

    fn report_search(&mut self, matched: usize) {
        if matched == 0 {
            self.notice = Some(Notice::Alert(NO_MATCH_NOTICE.to_string()));
            self.list_state.select(None);
        } else {
            self.notice = Some(Notice::Info(format!("{} appartement(s) affiché(s)", matched)));
            self.list_state.select(Some(0));
        }
    }

    pub fn clear(&mut self) {
        self.session.clear();
        self.list_state.select(None);
        self.notice = None;
    }

    pub fn share(&mut self) {
        match self.session.share_link(&self.config.share.base_url) {
            Ok(_) => self.notice = Some(Notice::Info("Lien de partage généré".to_string())),
            Err(e) => self.notice = Some(Notice::Alert(e.to_string())),
        }
    }

    /// Open the popup of the highlighted apartment
    pub fn open_selected(&mut self) {
        let selection = self.session.snapshot().selection;
        if let Some(apartment) = self.list_state.selected().and_then(|i| selection.get(i)) {
            if !self.session.open_info(&apartment.reference) {
                self.notice = Some(Notice::Info(format!("{} n'est pas encore placé sur la carte", apartment.reference)));
            }
        }
    }

    pub fn next(&mut self) {
        let len = self.session.snapshot().selection.len();
        if len == 0 {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.list_state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.session.snapshot().selection.len();
        if len == 0 {
            return;
        }
        let i = match self.list_state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.list_state.select(Some(i));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        app.drain_events();
        terminal.draw(|f| ui(f, app))?;

        // Redraw regularly so markers show up as geocodes land
        if !event::poll(Duration::from_millis(150))? {
            continue;
        }

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if matches!(app.notice, Some(Notice::Alert(_))) {
            app.notice = None;
            continue;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => return Ok(()),
            KeyCode::Char('c') if ctrl => return Ok(()),
            KeyCode::Char('l') if ctrl => app.clear(),
            KeyCode::Char('s') if ctrl => app.share(),
            KeyCode::Char('r') if ctrl => app.reload(),
            KeyCode::Enter => app.search(),
            KeyCode::Tab => app.open_selected(),
            KeyCode::Down => app.next(),
            KeyCode::Up => app.previous(),
            KeyCode::Backspace => {
                app.input.pop();
            }
            KeyCode::Char(c) if !ctrl => app.input.push(c),
            _ => {}
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Search field
            Constraint::Min(0),    // List + map
            Constraint::Length(3), // Share link
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_search(f, chunks[0], app);

    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(40), // Selected apartments
            Constraint::Percentage(60), // Map
        ])
        .split(chunks[1]);

    render_selection(f, content_chunks[0], app);
    render_map(f, content_chunks[1], app);
    render_share(f, chunks[2], app);
    render_status_bar(f, chunks[3], app);

    if let Some(Notice::Alert(text)) = &app.notice {
        render_alert(f, text);
    }
}

fn render_search(f: &mut Frame, area: Rect, app: &App) {
    let search = Paragraph::new(app.input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Références (ex: A1B205, A0B123) "),
    );
    f.render_widget(search, area);
    f.set_cursor(area.x + 1 + app.input.chars().count() as u16, area.y + 1);
}

fn render_selection(f: &mut Frame, area: Rect, app: &mut App) {
    let snapshot = app.session.snapshot();
    let placed: Vec<String> = app.session.with_map(|board| {
        board
            .markers()
            .filter(|m| m.kind == MarkerKind::Apartment)
            .map(|m| m.label.clone())
            .collect()
    });

    let items: Vec<ListItem> = snapshot
        .selection
        .iter()
        .map(|apt| {
            let dot = if placed.contains(&apt.reference) {
                Span::styled("● ", Style::default().fg(Color::Red))
            } else {
                Span::styled("○ ", Style::default().fg(Color::DarkGray))
            };
            ListItem::new(Line::from(vec![
                dot,
                Span::styled(apt.reference.clone(), Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(" - "),
                Span::raw(apt.address.clone()),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(" Appartements affichés sur la carte "),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");

    f.render_stateful_widget(list, area, &mut app.list_state);
}

fn marker_color(kind: MarkerKind) -> Color {
    match kind {
        MarkerKind::Landmark => Color::Blue,
        MarkerKind::Agency => Color::Green,
        MarkerKind::Apartment => Color::Red,
    }
}

fn render_map(f: &mut Frame, area: Rect, app: &App) {
    let map_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),    // Canvas
            Constraint::Length(4), // Popup
            Constraint::Length(1), // Legend
        ])
        .split(area);

    let (markers, open): (Vec<Marker>, Option<Marker>) = app
        .session
        .with_map(|board| (board.markers().cloned().collect(), board.open_marker().cloned()));

    let (lat, lng) = (app.config.map.center_lat, app.config.map.center_lng);
    let canvas = Canvas::default()
        .block(Block::default().borders(Borders::ALL).title(" Cannes "))
        .marker(symbols::Marker::Braille)
        .x_bounds([lng - MAP_SPAN_LNG, lng + MAP_SPAN_LNG])
        .y_bounds([lat - MAP_SPAN_LAT, lat + MAP_SPAN_LAT])
        .paint(|ctx| {
            for marker in &markers {
                let (x, y) = (marker.position.lng, marker.position.lat);
                let color = marker_color(marker.kind);
                ctx.draw(&Points {
                    coords: &[(x, y)],
                    color,
                });
                if marker.kind == MarkerKind::Apartment {
                    ctx.print(
                        x,
                        y,
                        Span::styled(
                            marker.label.clone(),
                            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                        ),
                    );
                }
            }
        });
    f.render_widget(canvas, map_chunks[0]);

    let popup_text = open.map(|m| m.info).unwrap_or_else(|| "Tab: détails de l'appartement".to_string());
    let popup = Paragraph::new(popup_text)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(" Info "));
    f.render_widget(popup, map_chunks[1]);

    let legend: Vec<Span> = [MarkerKind::Landmark, MarkerKind::Agency, MarkerKind::Apartment]
        .iter()
        .flat_map(|kind| {
            [
                Span::styled(" ● ", Style::default().fg(marker_color(*kind))),
                Span::raw(kind.legend().to_string()),
            ]
        })
        .collect();
    f.render_widget(Paragraph::new(Line::from(legend)), map_chunks[2]);
}

fn render_share(f: &mut Frame, area: Rect, app: &App) {
    let link = app.session.snapshot().share_link.unwrap_or_default();
    let share = Paragraph::new(link).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green))
            .title(" Lien de partage "),
    );
    f.render_widget(share, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let snapshot = app.session.snapshot();
    let loaded = match snapshot.loaded_at {
        Some(at) => format!(" {} appartements ({}) ", snapshot.record_count, at.format("%H:%M:%S")),
        None => " Données non chargées ".to_string(),
    };

    let mut status_spans = vec![Span::styled(loaded, Style::default().fg(Color::Cyan))];

    if let Some(Notice::Info(text)) = &app.notice {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(text.clone(), Style::default().fg(Color::Green)));
    }

    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Rechercher | "));
    status_spans.push(Span::styled("^L", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Effacer | "));
    status_spans.push(Span::styled("^S", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Partager | "));
    status_spans.push(Span::styled("^R", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Recharger | "));
    status_spans.push(Span::styled("Esc", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quitter"));

    let status_bar = Paragraph::new(Line::from(status_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_alert(f: &mut Frame, text: &str) {
    let area = centered_rect(60, 7, f.size());
    let alert = Paragraph::new(vec![
        Line::from(text.to_string()),
        Line::from(""),
        Line::from(Span::styled("(une touche pour fermer)", Style::default().fg(Color::DarkGray))),
    ])
    .wrap(Wrap { trim: true })
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red))
            .title(" Attention "),
    );

    f.render_widget(Clear, area);
    f.render_widget(alert, area);
}

fn centered_rect(percent_x: u16, height: u16, r: Rect) -> Rect {
    let width = (r.width as u32 * percent_x as u32 / 100) as u16;
    Rect {
        x: r.x + (r.width.saturating_sub(width)) / 2,
        y: r.y + (r.height.saturating_sub(height)) / 2,
        width,
        height: height.min(r.height),
    }
}
