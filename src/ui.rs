use crate::config::Settings;
use crate::dashboard::{
    distinct_sites, distinct_supervisors, format_amount, Bucket, DashboardView, Filter,
};
use crate::error::EntryError;
use crate::import::import_file;
use crate::normalizer::{parse_date, Normalized};
use crate::record::{ExpenseRecord, CATEGORY_CHOICES};
use crate::store::{export_report, ExpenseStore};
use anyhow::Result;
use chrono::NaiveDate;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{BarChart, Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::collections::BTreeSet;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    AddExpense,
    UploadFile,
    Dashboard,
    DataTable,
}

impl Page {
    pub const ALL: [Page; 4] = [Page::AddExpense, Page::UploadFile, Page::Dashboard, Page::DataTable];

    pub fn next(&self) -> Self {
        match self {
            Page::AddExpense => Page::UploadFile,
            Page::UploadFile => Page::Dashboard,
            Page::Dashboard => Page::DataTable,
            Page::DataTable => Page::AddExpense,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::AddExpense => Page::DataTable,
            Page::UploadFile => Page::AddExpense,
            Page::Dashboard => Page::UploadFile,
            Page::DataTable => Page::Dashboard,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Page::AddExpense => "Add Expense",
            Page::UploadFile => "Upload Expense File",
            Page::Dashboard => "View Dashboard",
            Page::DataTable => "Data Table",
        }
    }

    /// Pages with a text input swallow plain character keys.
    fn takes_text(&self) -> bool {
        matches!(self, Page::AddExpense | Page::UploadFile)
    }
}

// ============================================================================
// ADD EXPENSE FORM
// ============================================================================

const FORM_LABELS: [&str; 6] = ["Date", "Amount", "Category", "Supervisor", "Site", "Summary"];
const CATEGORY_FIELD: usize = 2;

pub struct EntryForm {
    pub date: String,
    pub amount: String,
    pub category: usize,
    pub supervisor: String,
    pub site: String,
    pub summary: String,
    pub focus: usize,
}

impl EntryForm {
    pub fn new() -> Self {
        EntryForm {
            date: chrono::Local::now().date_naive().format("%Y-%m-%d").to_string(),
            amount: String::new(),
            category: 0,
            supervisor: String::new(),
            site: String::new(),
            summary: String::new(),
            focus: 0,
        }
    }

    pub fn category(&self) -> &'static str {
        CATEGORY_CHOICES[self.category]
    }

    fn focused_text(&mut self) -> Option<&mut String> {
        match self.focus {
            0 => Some(&mut self.date),
            1 => Some(&mut self.amount),
            3 => Some(&mut self.supervisor),
            4 => Some(&mut self.site),
            5 => Some(&mut self.summary),
            _ => None,
        }
    }

    fn value(&self, idx: usize) -> String {
        match idx {
            0 => self.date.clone(),
            1 => self.amount.clone(),
            CATEGORY_FIELD => format!("< {} >", self.category()),
            3 => self.supervisor.clone(),
            4 => self.site.clone(),
            _ => self.summary.clone(),
        }
    }

    pub fn next_field(&mut self) {
        self.focus = (self.focus + 1) % FORM_LABELS.len();
    }

    pub fn previous_field(&mut self) {
        self.focus = (self.focus + FORM_LABELS.len() - 1) % FORM_LABELS.len();
    }

    pub fn push_char(&mut self, c: char) {
        if let Some(text) = self.focused_text() {
            text.push(c);
        }
    }

    pub fn pop_char(&mut self) {
        if let Some(text) = self.focused_text() {
            text.pop();
        }
    }

    pub fn cycle_category(&mut self, forward: bool) {
        let len = CATEGORY_CHOICES.len();
        self.category = if forward {
            (self.category + 1) % len
        } else {
            (self.category + len - 1) % len
        };
    }

    /// Blank amount counts as zero, like an untouched number input.
    /// Blank supervisor or site keep the "Unknown" fallback.
    pub fn to_record(&self) -> Result<ExpenseRecord, EntryError> {
        let amount = if self.amount.trim().is_empty() { "0" } else { self.amount.as_str() };

        Ok(ExpenseRecord::from_input(&self.date, amount)?
            .with_category(self.category())
            .with_entered_labels(Some(self.supervisor.as_str()), Some(self.site.as_str()))
            .with_summary(self.summary.trim()))
    }

    /// Clear everything but the date after a successful save.
    fn reset_keep_date(&mut self) {
        let date = std::mem::take(&mut self.date);
        *self = EntryForm::new();
        self.date = date;
    }
}

impl Default for EntryForm {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// APP STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct Status {
    pub kind: StatusKind,
    pub text: String,
}

/// Multiselect over the distinct values of one column.
///
/// `selected == None` means every value, which is also what a fresh
/// dashboard shows. An empty set selects nothing.
#[derive(Debug, Clone, Default)]
pub struct MultiSelect {
    pub selected: Option<BTreeSet<String>>,
    pub cursor: usize,
}

impl MultiSelect {
    pub fn move_cursor(&mut self, options: &[String]) {
        if options.is_empty() {
            self.cursor = 0;
        } else {
            self.cursor = (self.cursor + 1) % options.len();
        }
    }

    /// Flip the option under the cursor in or out of the selection.
    pub fn toggle(&mut self, options: &[String]) {
        let Some(current) = options.get(self.cursor) else {
            return;
        };

        let mut set = self
            .selected
            .take()
            .unwrap_or_else(|| options.iter().cloned().collect());
        if !set.remove(current) {
            set.insert(current.clone());
        }

        self.selected = if options.iter().all(|o| set.contains(o)) {
            None
        } else {
            Some(set)
        };
    }

    pub fn is_selected(&self, value: &str) -> bool {
        self.selected.as_ref().map_or(true, |s| s.contains(value))
    }

    pub fn reset(&mut self) {
        self.selected = None;
        self.cursor = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTarget {
    StartDate,
    EndDate,
}

#[derive(Debug, Clone)]
pub struct Prompt {
    pub target: PromptTarget,
    pub input: String,
}

pub struct App {
    pub settings: Settings,
    pub store: ExpenseStore,
    pub current_page: Page,
    pub form: EntryForm,
    pub upload_path: String,
    pub preview: Option<Normalized>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub sites: MultiSelect,
    pub supervisors: MultiSelect,
    pub prompt: Option<Prompt>,
    pub confirm_clear: bool,
    pub state: TableState,
    pub status: Option<Status>,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        let store = ExpenseStore::load(&settings.data_file);

        let mut state = TableState::default();
        if !store.is_empty() {
            state.select(Some(0));
        }

        Self {
            settings,
            store,
            current_page: Page::AddExpense,
            form: EntryForm::new(),
            upload_path: String::new(),
            preview: None,
            start: None,
            end: None,
            sites: MultiSelect::default(),
            supervisors: MultiSelect::default(),
            prompt: None,
            confirm_clear: false,
            state,
            status: None,
        }
    }

    /// Re-read the backing file; every page switch and mutation does this.
    pub fn reload(&mut self) {
        self.store = ExpenseStore::load(&self.settings.data_file);

        let len = self.store.len();
        match self.state.selected() {
            _ if len == 0 => self.state.select(None),
            Some(i) if i >= len => self.state.select(Some(len - 1)),
            None => self.state.select(Some(0)),
            _ => {}
        }
    }

    fn info(&mut self, text: impl Into<String>) {
        self.status = Some(Status { kind: StatusKind::Info, text: text.into() });
    }

    fn success(&mut self, text: impl Into<String>) {
        self.status = Some(Status { kind: StatusKind::Success, text: text.into() });
    }

    fn error(&mut self, text: impl Into<String>) {
        self.status = Some(Status { kind: StatusKind::Error, text: text.into() });
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
        self.confirm_clear = false;
        self.reload();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
        self.confirm_clear = false;
        self.reload();
    }

    // ------------------------------------------------------------------------
    // Add Expense
    // ------------------------------------------------------------------------

    pub fn save_form(&mut self) {
        let record = match self.form.to_record() {
            Ok(r) => r,
            Err(e) => {
                self.error(e.to_string());
                return;
            }
        };

        match self.store.append(record) {
            Ok(()) => {
                self.form.reset_keep_date();
                self.success("Expense saved successfully");
                self.reload();
            }
            Err(e) => self.error(format!("Could not save expense: {:#}", e)),
        }
    }

    // ------------------------------------------------------------------------
    // Upload
    // ------------------------------------------------------------------------

    /// Read and normalize the file named in the path box.
    pub fn load_preview(&mut self) {
        let path = self.upload_path.trim().to_string();
        if path.is_empty() {
            self.error("Type the path of a .csv, .tsv or .xlsx file first");
            return;
        }

        match import_file(Path::new(&path)) {
            Ok(normalized) => {
                let text = format!("{} - press Enter again to add to dashboard", normalized.summary());
                self.preview = Some(normalized);
                self.info(text);
            }
            Err(e) => {
                self.preview = None;
                self.error(e.to_string());
            }
        }
    }

    /// Append the previewed batch to the store.
    pub fn commit_preview(&mut self) {
        let Some(preview) = self.preview.take() else {
            return;
        };

        if preview.records.is_empty() {
            self.error("Nothing to import: no row had both a valid date and amount");
            return;
        }

        match self.store.append_batch(preview.records) {
            Ok(added) => {
                self.upload_path.clear();
                self.success(format!("File imported successfully ({} records)", added));
                self.reload();
            }
            Err(e) => self.error(format!("Import failed, nothing was added: {:#}", e)),
        }
    }

    // ------------------------------------------------------------------------
    // Dashboard
    // ------------------------------------------------------------------------

    /// Full span of the data, narrowed by whatever the user picked.
    pub fn filter(&self) -> Filter {
        let mut filter = Filter::spanning(self.store.records());
        if self.start.is_some() {
            filter.start = self.start;
        }
        if self.end.is_some() {
            filter.end = self.end;
        }
        if let Some(sites) = &self.sites.selected {
            filter.sites = Some(sites.clone());
        }
        if let Some(supervisors) = &self.supervisors.selected {
            filter.supervisors = Some(supervisors.clone());
        }
        filter
    }

    pub fn dashboard_view(&self) -> Option<DashboardView> {
        if self.store.is_empty() {
            return None;
        }
        Some(DashboardView::build(
            self.store.records(),
            &self.filter(),
            self.settings.spike_multiplier,
        ))
    }

    pub fn next_site(&mut self) {
        self.sites.move_cursor(&distinct_sites(self.store.records()));
    }

    pub fn toggle_site(&mut self) {
        self.sites.toggle(&distinct_sites(self.store.records()));
    }

    pub fn next_supervisor(&mut self) {
        self.supervisors.move_cursor(&distinct_supervisors(self.store.records()));
    }

    pub fn toggle_supervisor(&mut self) {
        self.supervisors.toggle(&distinct_supervisors(self.store.records()));
    }

    pub fn reset_filter(&mut self) {
        self.start = None;
        self.end = None;
        self.sites.reset();
        self.supervisors.reset();
        self.info("Filters reset");
    }

    pub fn open_prompt(&mut self, target: PromptTarget) {
        self.prompt = Some(Prompt { target, input: String::new() });
    }

    pub fn apply_prompt(&mut self) {
        let Some(prompt) = self.prompt.take() else {
            return;
        };

        match parse_date(&prompt.input) {
            Some(date) => match prompt.target {
                PromptTarget::StartDate => self.start = Some(date),
                PromptTarget::EndDate => self.end = Some(date),
            },
            None => self.error(format!("'{}' is not a recognised date", prompt.input.trim())),
        }
    }

    /// Write the filtered subset to the configured report file.
    pub fn export(&mut self) {
        self.reload();
        let Some(view) = self.dashboard_view() else {
            self.error("No data available");
            return;
        };

        let path = self.settings.report_file.clone();
        match export_report(&path, &view.records) {
            Ok(()) => self.success(format!(
                "Report with {} records written to {}",
                view.records.len(),
                path.display()
            )),
            Err(e) => self.error(format!("{:#}", e)),
        }
    }

    // ------------------------------------------------------------------------
    // Data table
    // ------------------------------------------------------------------------

    pub fn clear_all(&mut self) {
        self.confirm_clear = false;
        match self.store.clear() {
            Ok(()) => {
                self.success("All data cleared");
                self.reload();
            }
            Err(e) => self.error(format!("{:#}", e)),
        }
    }

    pub fn next(&mut self) {
        let len = self.store.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.store.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.store.len();
        if len == 0 {
            return;
        }
        let i = self.state.selected().map_or(0, |i| (i + 20).min(len - 1));
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let i = self.state.selected().map_or(0, |i| i.saturating_sub(20));
        self.state.select(Some(i));
    }

    // ------------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------------

    /// Apply one key press. Returns `true` when the app should quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL)
            && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q'))
        {
            return true;
        }

        if self.prompt.is_some() {
            match key.code {
                KeyCode::Enter => self.apply_prompt(),
                KeyCode::Esc => self.prompt = None,
                KeyCode::Backspace => {
                    if let Some(prompt) = self.prompt.as_mut() {
                        prompt.input.pop();
                    }
                }
                KeyCode::Char(c) => {
                    if let Some(prompt) = self.prompt.as_mut() {
                        prompt.input.push(c);
                    }
                }
                _ => {}
            }
            return false;
        }

        if self.confirm_clear {
            if key.code == KeyCode::Char('y') {
                self.clear_all();
            } else {
                self.confirm_clear = false;
                self.info("Clear cancelled");
            }
            return false;
        }

        match key.code {
            KeyCode::Esc => return true,
            KeyCode::Tab => {
                self.next_page();
                return false;
            }
            KeyCode::BackTab => {
                self.previous_page();
                return false;
            }
            KeyCode::Char('q') if !self.current_page.takes_text() => return true,
            _ => {}
        }

        match self.current_page {
            Page::AddExpense => self.handle_form_key(key),
            Page::UploadFile => self.handle_upload_key(key),
            Page::Dashboard => self.handle_dashboard_key(key),
            Page::DataTable => self.handle_table_key(key),
        }

        false
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Down => self.form.next_field(),
            KeyCode::Up => self.form.previous_field(),
            KeyCode::Left if self.form.focus == CATEGORY_FIELD => self.form.cycle_category(false),
            KeyCode::Right if self.form.focus == CATEGORY_FIELD => self.form.cycle_category(true),
            KeyCode::Backspace => self.form.pop_char(),
            KeyCode::Enter => self.save_form(),
            KeyCode::Char(c) => self.form.push_char(c),
            _ => {}
        }
    }

    fn handle_upload_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter if self.preview.is_some() => self.commit_preview(),
            KeyCode::Enter => self.load_preview(),
            KeyCode::Backspace => {
                self.upload_path.pop();
                self.preview = None;
            }
            KeyCode::Char(c) => {
                self.upload_path.push(c);
                self.preview = None;
            }
            _ => {}
        }
    }

    fn handle_dashboard_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('s') => self.open_prompt(PromptTarget::StartDate),
            KeyCode::Char('e') => self.open_prompt(PromptTarget::EndDate),
            KeyCode::Char('f') => self.next_site(),
            KeyCode::Char('F') => self.toggle_site(),
            KeyCode::Char('v') => self.next_supervisor(),
            KeyCode::Char('V') => self.toggle_supervisor(),
            KeyCode::Char('r') => self.reset_filter(),
            KeyCode::Char('x') => self.export(),
            _ => {}
        }
    }

    fn handle_table_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Down | KeyCode::Char('j') => self.next(),
            KeyCode::Up | KeyCode::Char('k') => self.previous(),
            KeyCode::PageDown => self.page_down(),
            KeyCode::PageUp => self.page_up(),
            KeyCode::Home => {
                if !self.store.is_empty() {
                    self.state.select(Some(0));
                }
            }
            KeyCode::End => {
                if !self.store.is_empty() {
                    self.state.select(Some(self.store.len() - 1));
                }
            }
            KeyCode::Char('D') if !self.store.is_empty() => {
                self.confirm_clear = true;
                self.info("Clear ALL data? Press y to confirm, any other key to cancel");
            }
            _ => {}
        }
    }
}

/// `[x] Depot  [ ] Yard`, option under the cursor highlighted.
fn multiselect_spans(label: &'static str, choice: &MultiSelect, options: &[String]) -> Vec<Span<'static>> {
    let mut spans = vec![Span::styled(label, Style::default().fg(Color::Yellow))];

    for (idx, option) in options.iter().enumerate() {
        let mark = if choice.is_selected(option) { "[x]" } else { "[ ]" };
        let style = if idx == choice.cursor {
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else if choice.is_selected(option) {
            Style::default().fg(Color::Gray)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(format!(" {} {} ", mark, option), style));
    }

    spans
}

// ============================================================================
// TERMINAL LOOP
// ============================================================================

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res.map_err(Into::into)
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if app.handle_key(key) {
                return Ok(());
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::AddExpense => render_add_expense(f, chunks[1], app),
        Page::UploadFile => render_upload(f, chunks[1], app),
        Page::Dashboard => render_dashboard(f, chunks[1], app),
        Page::DataTable => render_data_table(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in Page::ALL.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title(), style));
    }

    let total: f64 = app.store.records().iter().map(|r| r.amount).sum();
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Records: {}", app.store.len()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format_amount(&app.settings.currency_symbol, total),
        Style::default().fg(Color::Green),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Expense Dashboard "),
    );

    f.render_widget(header, area);
}

fn render_add_expense(f: &mut Frame, area: Rect, app: &App) {
    let mut content = vec![Line::from("")];

    for (idx, label) in FORM_LABELS.iter().enumerate() {
        let focused = idx == app.form.focus;
        let marker = if focused {
            Span::styled("→ ", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
        } else {
            Span::raw("  ")
        };
        let value_style = if focused {
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        let cursor = if focused && idx != CATEGORY_FIELD { "▏" } else { "" };

        content.push(Line::from(vec![
            Span::raw("  "),
            marker,
            Span::styled(
                format!("{:<12}", format!("{}:", label)),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("{}{}", app.form.value(idx), cursor), value_style),
        ]));
        content.push(Line::from(""));
    }

    content.push(Line::from(vec![Span::styled(
        "  ↑/↓ move between fields · ←/→ change category · Enter save expense",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )]));

    let form = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Add New Expense "),
    );

    f.render_widget(form, area);
}

fn render_upload(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let input = Paragraph::new(Line::from(vec![
        Span::styled(" File: ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(format!("{}▏", app.upload_path)),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Upload CSV / Excel (Enter to preview) "),
    );
    f.render_widget(input, chunks[0]);

    match &app.preview {
        Some(preview) => {
            let title = format!(" Cleaned Data Preview - {} ", preview.summary());
            let table = records_table(&preview.records, &title, &app.settings.currency_symbol);
            f.render_widget(table, chunks[1]);
        }
        None => {
            let hint = Paragraph::new(vec![
                Line::from(""),
                Line::from("  Headers are matched case-insensitively, e.g. \"Purchase Date\", \"Cost\","),
                Line::from("  \"Location\", \"Manager\", \"Remark\". Rows without a valid date and amount"),
                Line::from("  are dropped; missing Category/Supervisor/Site fall back to Other/Unknown."),
            ])
            .block(Block::default().borders(Borders::ALL).title(" Preview "));
            f.render_widget(hint, chunks[1]);
        }
    }
}

fn render_dashboard(f: &mut Frame, area: Rect, app: &App) {
    let Some(view) = app.dashboard_view() else {
        let empty = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(
                "  No data available",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )),
        ])
        .block(Block::default().borders(Borders::ALL).title(" Expense Analytics "));
        f.render_widget(empty, area);
        return;
    };

    let symbol = app.settings.currency_symbol.as_str();

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),  // Filters
            Constraint::Length(3),  // KPIs
            Constraint::Length(10), // Trend
            Constraint::Min(6),     // Breakdowns
            Constraint::Length(8),  // Spikes
        ])
        .split(area);

    // -------- Filters --------
    let date_text = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());
    let mut filter_spans = vec![
        Span::styled(" Start ", Style::default().fg(Color::Yellow)),
        Span::raw(date_text(view.filter.start)),
        Span::styled("  End ", Style::default().fg(Color::Yellow)),
        Span::raw(date_text(view.filter.end)),
    ];
    if let Some(prompt) = &app.prompt {
        let label = match prompt.target {
            PromptTarget::StartDate => "  New start: ",
            PromptTarget::EndDate => "  New end: ",
        };
        filter_spans.push(Span::styled(label, Style::default().fg(Color::Green)));
        filter_spans.push(Span::raw(format!("{}▏", prompt.input)));
    }
    let sites = distinct_sites(app.store.records());
    let supervisors = distinct_supervisors(app.store.records());
    let filters = Paragraph::new(vec![
        Line::from(filter_spans),
        Line::from(multiselect_spans(" Sites       ", &app.sites, &sites)),
        Line::from(multiselect_spans(" Supervisors ", &app.supervisors, &supervisors)),
    ])
    .block(Block::default().borders(Borders::ALL).title(" Filters "));
    f.render_widget(filters, rows[0]);

    // -------- KPIs --------
    let kpi_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(25); 4])
        .split(rows[1]);
    let kpis = [
        ("Total Spend", format_amount(symbol, view.kpis.total_spend), Color::Green),
        ("Records", view.kpis.records.to_string(), Color::White),
        ("Sites", view.kpis.sites.to_string(), Color::Cyan),
        ("Supervisors", view.kpis.supervisors.to_string(), Color::Magenta),
    ];
    for (chunk, (title, value, color)) in kpi_chunks.iter().zip(kpis) {
        let widget = Paragraph::new(Span::styled(
            format!(" {}", value),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ))
        .block(Block::default().borders(Borders::ALL).title(format!(" {} ", title)));
        f.render_widget(widget, *chunk);
    }

    // -------- Trend --------
    let labels: Vec<String> = view
        .trend
        .iter()
        .map(|b| b.key.get(5..).unwrap_or(&b.key).to_string())
        .collect();
    let bars: Vec<(&str, u64)> = labels
        .iter()
        .zip(&view.trend)
        .map(|(label, b)| (label.as_str(), b.total.round() as u64))
        .collect();
    let trend = BarChart::default()
        .block(Block::default().borders(Borders::ALL).title(" Expense Trend "))
        .data(bars.as_slice())
        .bar_width(5)
        .bar_gap(1)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));
    f.render_widget(trend, rows[2]);

    // -------- Breakdowns --------
    let breakdown_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[3]);
    f.render_widget(
        bucket_table(&view.by_category, "Category", " Category-wise Spend ", symbol),
        breakdown_chunks[0],
    );
    f.render_widget(
        bucket_table(&view.by_site, "Site", " Site-wise Spend ", symbol),
        breakdown_chunks[1],
    );

    // -------- Spikes --------
    if view.spikes.is_empty() {
        let ok = Paragraph::new(Span::styled(
            " No abnormal expenses detected",
            Style::default().fg(Color::Green),
        ))
        .block(Block::default().borders(Borders::ALL).title(" Expense Alerts "));
        f.render_widget(ok, rows[4]);
    } else {
        let title = format!(
            " Expense Alerts - high expense entries detected (> {}) ",
            format_amount(symbol, view.spike_threshold.unwrap_or_default())
        );
        let table = records_table(&view.spikes, &title, symbol)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Red))
                    .title(title.clone()),
            );
        f.render_widget(table, rows[4]);
    }
}

fn render_data_table(f: &mut Frame, area: Rect, app: &mut App) {
    if app.store.is_empty() {
        let empty = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(
                "  No records found",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )),
        ])
        .block(Block::default().borders(Borders::ALL).title(" Expense Records "));
        f.render_widget(empty, area);
        return;
    }

    let table = records_table(app.store.records(), " Expense Records ", &app.settings.currency_symbol)
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![];

    if let Some(status) = &app.status {
        let color = match status.kind {
            StatusKind::Info => Color::Cyan,
            StatusKind::Success => Color::Green,
            StatusKind::Error => Color::Red,
        };
        status_spans.push(Span::styled(format!(" {} ", status.text), Style::default().fg(color)));
        status_spans.push(Span::raw(" | "));
    }

    let hints: &[(&str, &str)] = match app.current_page {
        Page::AddExpense | Page::UploadFile => &[("Enter", "Submit"), ("Tab", "Page"), ("Esc", "Quit")],
        Page::Dashboard => &[
            ("s/e", "Dates"),
            ("f/F", "Site move/toggle"),
            ("v/V", "Supervisor move/toggle"),
            ("r", "Reset"),
            ("x", "Export"),
            ("Tab", "Page"),
            ("q", "Quit"),
        ],
        Page::DataTable => &[("↑/↓", "Nav"), ("D", "Clear all"), ("Tab", "Page"), ("q", "Quit")],
    };
    for (i, (key, action)) in hints.iter().enumerate() {
        if i > 0 {
            status_spans.push(Span::raw(" | "));
        }
        status_spans.push(Span::styled(*key, Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(format!(" {}", action)));
    }

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn records_table<'a>(records: &'a [ExpenseRecord], title: &str, symbol: &str) -> Table<'a> {
    let header_cells = ["Date", "Amount", "Category", "Supervisor", "Site", "Summary"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = records.iter().map(|r| {
        Row::new(vec![
            Cell::from(r.date.format("%Y-%m-%d").to_string()),
            Cell::from(format_amount(symbol, r.amount)).style(Style::default().fg(Color::Green)),
            Cell::from(truncate(&r.category, 14)),
            Cell::from(truncate(&r.supervisor, 18)),
            Cell::from(truncate(&r.site, 18)),
            Cell::from(truncate(&r.summary, 40)),
        ])
        .height(1)
    });

    Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(16),
            Constraint::Length(16),
            Constraint::Length(20),
            Constraint::Length(20),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title.to_string()),
    )
}

fn bucket_table<'a>(buckets: &'a [Bucket], key_name: &'a str, title: &'a str, symbol: &str) -> Table<'a> {
    let header = Row::new(
        [key_name, "Entries", "Total"]
            .into_iter()
            .map(|h| Cell::from(h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))),
    )
    .style(Style::default().bg(Color::DarkGray));

    let rows = buckets.iter().map(|b| {
        Row::new(vec![
            Cell::from(truncate(&b.key, 24)),
            Cell::from(b.count.to_string()),
            Cell::from(format_amount(symbol, b.total)).style(Style::default().fg(Color::Green)),
        ])
    });

    Table::new(rows, [Constraint::Min(12), Constraint::Length(8), Constraint::Length(18)])
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use tempfile::TempDir;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
    }

    fn create_test_app(dir: &TempDir) -> App {
        let mut settings = Settings::defaults().with_data_file(dir.path().join("expenses.csv"));
        settings.report_file = dir.path().join("report.csv");
        App::new(settings)
    }

    fn seed(app: &mut App, rows: &[(&str, f64, &str, &str)]) {
        let records = rows
            .iter()
            .map(|(date, amount, site, supervisor)| {
                ExpenseRecord::from_input(date, &amount.to_string())
                    .unwrap()
                    .with_site(*site)
                    .with_supervisor(*supervisor)
            })
            .collect();
        app.store.append_batch(records).unwrap();
        app.reload();
    }

    fn draw(app: &mut App) {
        let mut terminal = Terminal::new(TestBackend::new(140, 48)).unwrap();
        terminal.draw(|f| ui(f, app)).unwrap();
    }

    #[test]
    fn test_page_cycle() {
        let mut page = Page::AddExpense;
        for _ in 0..4 {
            page = page.next();
        }
        assert_eq!(page, Page::AddExpense);
        assert_eq!(Page::AddExpense.previous(), Page::DataTable);
    }

    #[test]
    fn test_add_expense_via_keys() {
        let dir = TempDir::new().unwrap();
        let mut app = create_test_app(&dir);

        // Date field: replace today's date
        for _ in 0..10 {
            app.handle_key(key(KeyCode::Backspace));
        }
        type_text(&mut app, "2024-01-05");
        app.handle_key(key(KeyCode::Down));
        type_text(&mut app, "250");
        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Right)); // Food -> Travel
        app.handle_key(key(KeyCode::Down));
        type_text(&mut app, "Asha");
        app.handle_key(key(KeyCode::Down));
        type_text(&mut app, "Depot");
        app.handle_key(key(KeyCode::Down));
        type_text(&mut app, "quick lunch");
        app.handle_key(key(KeyCode::Enter));

        assert_eq!(app.status.as_ref().unwrap().kind, StatusKind::Success);
        let reloaded = ExpenseStore::load(dir.path().join("expenses.csv"));
        assert_eq!(reloaded.len(), 1);
        let r = &reloaded.records()[0];
        assert_eq!(r.amount, 250.0);
        assert_eq!(r.category, "Travel");
        assert_eq!(r.supervisor, "Asha");
        assert_eq!(r.site, "Depot");
        assert_eq!(r.summary, "quick lunch");
        assert_eq!(app.form.amount, "");
        assert_eq!(app.form.date, "2024-01-05");
    }

    #[test]
    fn test_blank_form_fields_fall_back() {
        let mut form = EntryForm::new();
        form.date = "2024-02-01".to_string();

        let record = form.to_record().unwrap();

        assert_eq!(record.amount, 0.0);
        assert_eq!(record.category, "Food");
        assert_eq!(record.site, "Unknown");
        assert_eq!(record.supervisor, "Unknown");
    }

    #[test]
    fn test_q_is_text_on_form_pages() {
        let dir = TempDir::new().unwrap();
        let mut app = create_test_app(&dir);

        assert!(!app.handle_key(key(KeyCode::Char('q'))));
        app.current_page = Page::DataTable;
        assert!(app.handle_key(key(KeyCode::Char('q'))));
    }

    #[test]
    fn test_invalid_amount_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut app = create_test_app(&dir);

        app.form.amount = "-5".to_string();
        app.save_form();

        assert_eq!(app.status.as_ref().unwrap().kind, StatusKind::Error);
        assert!(app.store.is_empty());
    }

    #[test]
    fn test_upload_preview_then_commit() {
        let dir = TempDir::new().unwrap();
        let upload = dir.path().join("upload.csv");
        std::fs::write(&upload, "Purchase Date,Cost,Remark\n2024-01-05,250,lunch\nnope,1,x\n").unwrap();

        let mut app = create_test_app(&dir);
        app.current_page = Page::UploadFile;
        type_text(&mut app, &upload.to_string_lossy());

        app.handle_key(key(KeyCode::Enter));
        let preview = app.preview.as_ref().expect("preview loaded");
        assert_eq!(preview.records.len(), 1);
        assert!(app.store.is_empty(), "preview must not write");

        app.handle_key(key(KeyCode::Enter));
        assert!(app.preview.is_none());
        assert_eq!(app.store.len(), 1);
        assert_eq!(app.store.records()[0].summary, "lunch");
    }

    #[test]
    fn test_upload_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut app = create_test_app(&dir);
        app.current_page = Page::UploadFile;
        type_text(&mut app, "report.pdf");

        app.handle_key(key(KeyCode::Enter));

        assert!(app.preview.is_none());
        let status = app.status.as_ref().unwrap();
        assert_eq!(status.kind, StatusKind::Error);
        assert!(status.text.contains("Unsupported file type"));
    }

    #[test]
    fn test_dashboard_filter_and_export() {
        let dir = TempDir::new().unwrap();
        let mut app = create_test_app(&dir);
        seed(
            &mut app,
            &[
                ("2024-01-01", 10.0, "Depot", "Asha"),
                ("2024-01-02", 10.0, "Yard", "Ravi"),
                ("2024-01-03", 10.0, "Depot", "Ravi"),
                ("2024-01-04", 100.0, "Yard", "Asha"),
            ],
        );
        app.current_page = Page::Dashboard;

        let view = app.dashboard_view().unwrap();
        assert_eq!(view.kpis.records, 4);
        assert_eq!(view.spikes.len(), 1);

        app.handle_key(key(KeyCode::Char('f'))); // cursor on Yard
        app.handle_key(key(KeyCode::Char('F'))); // untick Yard
        assert!(app.sites.is_selected("Depot"));
        assert!(!app.sites.is_selected("Yard"));
        app.handle_key(key(KeyCode::Char('s')));
        type_text(&mut app, "2024-01-02");
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.start, NaiveDate::from_ymd_opt(2024, 1, 2));

        let view = app.dashboard_view().unwrap();
        assert_eq!(view.kpis.records, 1);

        app.handle_key(key(KeyCode::Char('x')));
        let report = std::fs::read_to_string(dir.path().join("report.csv")).unwrap();
        assert_eq!(report.lines().count(), 2);
        assert!(report.contains("2024-01-03"));

        app.handle_key(key(KeyCode::Char('r')));
        assert_eq!(app.dashboard_view().unwrap().kpis.records, 4);
    }

    #[test]
    fn test_multiselect_toggle() {
        let options = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let mut choice = MultiSelect::default();
        assert!(choice.selected.is_none());

        choice.toggle(&options); // untick A
        assert_eq!(choice.selected, Some(BTreeSet::from(["B".to_string(), "C".to_string()])));

        choice.move_cursor(&options);
        choice.toggle(&options); // untick B
        assert_eq!(choice.selected, Some(BTreeSet::from(["C".to_string()])));

        choice.move_cursor(&options);
        choice.toggle(&options); // untick C: nothing left
        assert_eq!(choice.selected, Some(BTreeSet::new()));

        choice.move_cursor(&options); // wraps to A
        assert_eq!(choice.cursor, 0);
        choice.toggle(&options);
        assert!(choice.is_selected("A"));
        assert!(!choice.is_selected("B"));
    }

    #[test]
    fn test_ticking_everything_back_means_all() {
        let options = vec!["A".to_string(), "B".to_string()];
        let mut choice = MultiSelect::default();

        choice.toggle(&options);
        choice.toggle(&options);

        assert!(choice.selected.is_none());
    }

    #[test]
    fn test_dashboard_multiple_supervisors() {
        let dir = TempDir::new().unwrap();
        let mut app = create_test_app(&dir);
        seed(
            &mut app,
            &[
                ("2024-01-01", 10.0, "Depot", "Asha"),
                ("2024-01-02", 20.0, "Yard", "Ravi"),
                ("2024-01-03", 30.0, "Depot", "Meena"),
            ],
        );
        app.current_page = Page::Dashboard;

        // untick Ravi only; Asha and Meena stay selected
        app.handle_key(key(KeyCode::Char('v')));
        app.handle_key(key(KeyCode::Char('V')));

        let view = app.dashboard_view().unwrap();
        assert_eq!(view.kpis.records, 2);
        assert_eq!(view.kpis.total_spend, 40.0);
        assert_eq!(view.kpis.supervisors, 2);

        app.handle_key(key(KeyCode::Char('r')));
        assert!(app.supervisors.selected.is_none());
        assert_eq!(app.dashboard_view().unwrap().kpis.records, 3);
    }

    #[test]
    fn test_clear_requires_confirmation() {
        let dir = TempDir::new().unwrap();
        let mut app = create_test_app(&dir);
        seed(&mut app, &[("2024-01-01", 5.0, "A", "X")]);
        app.current_page = Page::DataTable;

        app.handle_key(key(KeyCode::Char('D')));
        app.handle_key(key(KeyCode::Char('n')));
        assert_eq!(app.store.len(), 1);

        app.handle_key(key(KeyCode::Char('D')));
        app.handle_key(key(KeyCode::Char('y')));
        assert!(app.store.is_empty());
        assert!(ExpenseStore::load(dir.path().join("expenses.csv")).is_empty());
    }

    #[test]
    fn test_every_page_renders() {
        let dir = TempDir::new().unwrap();
        let mut app = create_test_app(&dir);

        for page in Page::ALL {
            app.current_page = page;
            draw(&mut app);
        }

        seed(
            &mut app,
            &[("2024-01-01", 10.0, "Depot", "Asha"), ("2024-01-02", 500.0, "Yard", "Ravi")],
        );
        for page in Page::ALL {
            app.current_page = page;
            draw(&mut app);
        }
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("₹₹₹₹₹₹₹₹", 5), "₹₹...");
    }
}
