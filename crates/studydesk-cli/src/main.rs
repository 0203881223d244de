mod keys;
mod view;

use anyhow::Result;
use crossterm::{
    event::{
        self, DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
        Event, KeyCode, KeyEvent, KeyEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use keys::{Action, Motion};
use log::{error, info};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::{
    env, fs,
    io::{Stdout, stdout},
    path::{Path, PathBuf},
    process,
};
use studydesk_config::{Config, Theme};
use studydesk_engine::{
    Cmd, EditOutcome, Editor, FileStore, ImagePayload, MemorySurface, NoteFormat, NoteKey,
    NoteStore, Selection, io, write_export,
};

enum PromptKind {
    NewNote,
    ImagePath,
}

struct Prompt {
    kind: PromptKind,
    input: String,
}

impl Prompt {
    fn label(&self) -> &'static str {
        match self.kind {
            PromptKind::NewNote => "New note (subject/topic/subtopic[.md]): ",
            PromptKind::ImagePath => "Image file: ",
        }
    }
}

struct App {
    config: Config,
    store: FileStore,
    keys: Vec<NoteKey>,
    list_state: ListState,
    editor: Option<Editor>,
    surface: MemorySurface,
    prompt: Option<Prompt>,
    status: String,
    confirm_discard: bool,
    should_quit: bool,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let store = FileStore::open(&config.notes_path)?;
        let keys = store.keys()?;

        let mut list_state = ListState::default();
        // Select first note if available
        if !keys.is_empty() {
            list_state.select(Some(0));
        }

        Ok(Self {
            status: format!("{} notes in {}", keys.len(), config.notes_path.display()),
            config,
            store,
            keys,
            list_state,
            editor: None,
            surface: MemorySurface::new(),
            prompt: None,
            confirm_discard: false,
            should_quit: false,
        })
    }

    fn refresh_keys(&mut self) {
        match self.store.keys() {
            Ok(keys) => self.keys = keys,
            Err(e) => self.status = format!("Error listing notes: {e}"),
        }
        if self.keys.is_empty() {
            self.list_state.select(None);
        } else if self.list_state.selected().is_none_or(|i| i >= self.keys.len()) {
            self.list_state.select(Some(0));
        }
    }

    fn next_note(&mut self) {
        if self.keys.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => (i + 1) % self.keys.len(),
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    fn previous_note(&mut self) {
        if self.keys.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(0) | None => self.keys.len() - 1,
            Some(i) => i - 1,
        };
        self.list_state.select(Some(i));
    }

    fn open_selected(&mut self) {
        if let Some(index) = self.list_state.selected()
            && let Some(key) = self.keys.get(index)
        {
            self.open(key.clone());
        }
    }

    fn open(&mut self, key: NoteKey) {
        let mut editor = Editor::open(&self.store, key);
        self.surface = MemorySurface::new();
        self.surface.focus();
        editor.render(&mut self.surface);
        editor.restore_pending(&mut self.surface);
        self.status = format!("Editing {}", editor.key());
        self.editor = Some(editor);
    }

    fn create_note(&mut self, input: &str) {
        match NoteKey::parse(input.trim()) {
            Some(key) if FileStore::relative_path(&key).is_ok() => self.open(key),
            _ => self.status = format!("Not a note name: {input:?} (expected subject/topic/subtopic)"),
        }
    }

    fn execute(&mut self, cmd: Cmd) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        match editor.execute(cmd) {
            Ok(EditOutcome::Suppressed) => {
                self.status = "The title heading cannot be emptied".to_string();
            }
            Ok(_) => {
                editor.render(&mut self.surface);
                editor.restore_pending(&mut self.surface);
            }
            Err(e) => self.status = e.to_string(),
        }
    }

    /// Pasted text is treated as markup typed into the surface, so it goes
    /// through the sanitizing input cycle rather than a command.
    fn paste(&mut self, text: &str) {
        if let Some(prompt) = self.prompt.as_mut() {
            prompt.input.push_str(text.lines().next().unwrap_or_default());
            return;
        }
        if self
            .editor
            .as_ref()
            .is_some_and(|editor| !editor.document().selection().is_collapsed())
        {
            self.execute(Cmd::DeleteBackward);
        }
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        if !editor.document().selection().is_collapsed() {
            return;
        }

        editor.render(&mut self.surface);
        editor.restore_pending(&mut self.surface);
        if !self.surface.paste(text) {
            self.status = "Nowhere to paste".to_string();
            return;
        }
        if editor.apply_input(&mut self.surface) == EditOutcome::Unchanged {
            self.status = "Nothing pasted".to_string();
        }
        editor.restore_pending(&mut self.surface);
    }

    fn move_caret(&mut self, motion: Motion, extend: bool) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        let doc = editor.document();
        let selection = *doc.selection();
        let focus = match motion {
            Motion::Left => doc.position_before(selection.focus),
            Motion::Right => doc.position_after(selection.focus),
            Motion::Up => doc.position_above(selection.focus),
            Motion::Down => doc.position_below(selection.focus),
        };
        let anchor = if extend { selection.anchor } else { focus };
        editor.set_selection(Selection::new(anchor, focus));
    }

    fn insert_image_from(&mut self, path: &str) {
        let path = Path::new(path.trim());
        match fs::read(path) {
            Ok(bytes) => {
                let image = ImagePayload::new(media_type_for(path), bytes);
                self.execute(Cmd::InsertImage { image });
            }
            Err(e) => self.status = format!("Error reading {}: {e}", path.display()),
        }
    }

    fn save(&mut self) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        editor.save(&mut self.store);
        self.status = match editor.saved_content() {
            Some(saved) if saved == editor.stored_content() => format!("Saved {}", editor.key()),
            _ => format!("Could not write {}, see the log", editor.key()),
        };
        self.refresh_keys();
    }

    fn export(&mut self, format: NoteFormat) {
        let Some(editor) = self.editor.as_ref() else {
            return;
        };
        let file = editor.export(format);
        let dir = self.config.notes_path.join("exports");
        self.status = match write_export(&dir, &file) {
            Ok(path) => format!("Exported {}", path.display()),
            Err(e) => format!("Export failed: {e}"),
        };
    }

    fn back_to_list(&mut self) {
        let Some(editor) = self.editor.as_ref() else {
            return;
        };
        if editor.is_dirty() && !self.confirm_discard {
            self.confirm_discard = true;
            self.status = "Unsaved changes: Ctrl-S to save, Esc again to discard".to_string();
            return;
        }
        if let Some(editor) = self.editor.take() {
            editor.close();
        }
        self.confirm_discard = false;
        self.status = String::new();
        self.refresh_keys();
    }

    fn toggle_theme(&mut self) {
        self.config.theme = self.config.theme.toggled();
        self.persist_config();
    }

    fn toggle_sidebar(&mut self) {
        self.config.sidebar_open = !self.config.sidebar_open;
        self.persist_config();
    }

    fn persist_config(&mut self) {
        if let Err(e) = self.config.save() {
            error!("Failed to save config: {e}");
            self.status = format!("Settings not saved: {e}");
        }
    }

    fn submit_prompt(&mut self, prompt: Prompt) {
        match prompt.kind {
            PromptKind::NewNote => self.create_note(&prompt.input),
            PromptKind::ImagePath => self.insert_image_from(&prompt.input),
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if let Some(prompt) = self.prompt.as_mut() {
            match key.code {
                KeyCode::Esc => self.prompt = None,
                KeyCode::Enter => {
                    if let Some(prompt) = self.prompt.take() {
                        self.submit_prompt(prompt);
                    }
                }
                KeyCode::Backspace => {
                    prompt.input.pop();
                }
                KeyCode::Char(c) => prompt.input.push(c),
                _ => {}
            }
            return;
        }

        let action = if self.editor.is_some() {
            keys::editor_action(key)
        } else {
            keys::list_action(key)
        };
        let Some(action) = action else {
            return;
        };
        if action != Action::Back {
            self.confirm_discard = false;
        }

        match action {
            Action::Quit => self.should_quit = true,
            Action::NextNote => self.next_note(),
            Action::PreviousNote => self.previous_note(),
            Action::OpenNote => self.open_selected(),
            Action::NewNote => {
                self.prompt = Some(Prompt {
                    kind: PromptKind::NewNote,
                    input: String::new(),
                });
            }
            Action::Back => self.back_to_list(),
            Action::ToggleTheme => self.toggle_theme(),
            Action::ToggleSidebar => self.toggle_sidebar(),
            Action::Edit(cmd) => self.execute(cmd),
            Action::Move { motion, extend } => self.move_caret(motion, extend),
            Action::PromptImage => {
                self.prompt = Some(Prompt {
                    kind: PromptKind::ImagePath,
                    input: String::new(),
                });
            }
            Action::Save => self.save(),
            Action::Export(format) => self.export(format),
        }
    }
}

/// Declared media type of an image file, from its extension.
fn media_type_for(path: &Path) -> String {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Logs go to a file so they don't draw over the terminal UI.
fn init_logging() -> Result<PathBuf> {
    let log_path = env::temp_dir().join("studydesk.log");
    let file = fs::File::create(&log_path)?;
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(log_path)
}

fn main() -> Result<()> {
    let log_path = init_logging()?;
    info!("studydesk starting up, logging to {}", log_path.display());

    // Determine notes path from CLI args or config file
    let args: Vec<String> = env::args().collect();
    let config_path = Config::config_path();
    let loaded = Config::load();

    let from_config;
    let config = if args.len() == 2 {
        // CLI argument provided - it wins over the configured path
        from_config = false;
        let mut config = match loaded {
            Ok(Some(config)) => config,
            _ => Config::new(&args[1]),
        };
        config.notes_path = PathBuf::from(&args[1]);
        config
    } else if args.len() == 1 {
        from_config = true;
        match loaded {
            Ok(Some(config)) => config,
            Ok(None) => {
                eprintln!("Error: No notes path provided and no config file found");
                eprintln!("Usage: {} <notes-folder-path>", args[0]);
                eprintln!("Or create a config file at {}", config_path.display());
                process::exit(1);
            }
            Err(e) => {
                eprintln!("Error: Failed to load config file: {e}");
                eprintln!("Usage: {} <notes-folder-path>", args[0]);
                process::exit(1);
            }
        }
    } else {
        eprintln!("Usage: {} [notes-folder-path]", args[0]);
        process::exit(1);
    };

    if let Err(e) = io::validate_notes_dir(&config.notes_path) {
        let source = if from_config {
            format!(" from config file '{}'", config_path.display())
        } else {
            String::new()
        };
        eprintln!(
            "Error: Notes path '{}'{} is invalid: {e}",
            config.notes_path.display(),
            source
        );
        process::exit(1);
    }

    let mut app = App::new(config)?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableBracketedPaste
    )?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Main loop
    let res = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        error!("{err:?}");
        println!("{err:?}");
    }

    Ok(())
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => app.handle_key(key),
            Event::Paste(text) => app.paste(&text),
            _ => {}
        }
        if app.should_quit {
            return Ok(());
        }
    }
}

fn theme_styles(theme: Theme) -> (Style, Style) {
    match theme {
        Theme::Light => (
            Style::default().fg(Color::Black).bg(Color::White),
            Style::default().bg(Color::Yellow).fg(Color::Black),
        ),
        Theme::Dark => (
            Style::default().fg(Color::White).bg(Color::Black),
            Style::default().bg(Color::Blue).fg(Color::White),
        ),
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let (base, highlight) = theme_styles(app.config.theme);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1), Constraint::Length(1)])
        .split(f.area());

    let panes = if app.config.sidebar_open {
        [Constraint::Percentage(30), Constraint::Percentage(70)]
    } else {
        [Constraint::Percentage(0), Constraint::Percentage(100)]
    };
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(panes)
        .split(rows[0]);

    // Note list panel
    if app.config.sidebar_open {
        let note_items: Vec<ListItem> = app
            .keys
            .iter()
            .map(|key| {
                let suffix = match key.format {
                    NoteFormat::Html => "",
                    NoteFormat::Markdown => " (md)",
                };
                let display_text = format!(
                    "{} › {} › {}{suffix}",
                    key.subject, key.topic, key.subtopic
                );
                ListItem::new(Line::from(Span::raw(display_text)))
            })
            .collect();

        let notes_list = List::new(note_items)
            .style(base)
            .block(Block::default().borders(Borders::ALL).title("Notes"))
            .highlight_style(highlight);

        f.render_stateful_widget(notes_list, chunks[0], &mut app.list_state);
    }

    // Editor panel
    let (title, content_text) = match &app.editor {
        Some(editor) => {
            let marker = if editor.is_dirty() { " *" } else { "" };
            (
                format!("{}{marker}", editor.key()),
                view::document_lines(editor.document(), base),
            )
        }
        None => (
            "Note".to_string(),
            vec![Line::from("Select a note and press Enter, or Ctrl-N for a new note")],
        ),
    };

    let content = Paragraph::new(content_text)
        .style(base)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false });

    f.render_widget(content, chunks[1]);

    // Status line, or the open prompt
    let status = match &app.prompt {
        Some(prompt) => format!("{}{}", prompt.label(), prompt.input),
        None => app.status.clone(),
    };
    f.render_widget(Paragraph::new(Line::from(status)).style(highlight), rows[1]);

    let help_text = if app.editor.is_some() {
        "^S Save | ^B Bold | ^T Italic | Alt-1..3 Heading | Alt-0 Text | ^L/^O List | ^G Image | ^E/^D Export | Esc Back"
    } else {
        "q Quit | ↑/k Previous | ↓/j Next | Enter Open | ^N New | F2 Theme | F3 Sidebar"
    };
    f.render_widget(Paragraph::new(Line::from(help_text)).style(base), rows[2]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;
    use studydesk_engine::EditSurface;
    use tempfile::TempDir;

    fn app_with_notes(notes: &[(&str, &str)]) -> (TempDir, App) {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();
        for (key, content) in notes {
            store.save(&NoteKey::parse(key).unwrap(), content).unwrap();
        }
        let app = App::new(Config::new(dir.path())).unwrap();
        (dir, app)
    }

    fn press(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
        app.handle_key(KeyEvent::new(code, modifiers));
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c), KeyModifiers::NONE);
        }
    }

    #[test]
    fn test_media_type_for() {
        assert_eq!(media_type_for(Path::new("map.PNG")), "image/png");
        assert_eq!(media_type_for(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(media_type_for(Path::new("notes.txt")), "application/octet-stream");
        assert_eq!(media_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn test_open_type_and_save() {
        // Given a notes folder with one note
        let (_dir, mut app) = app_with_notes(&[("Humanities/Maps/Geography", "<h1>Geography</h1>")]);
        assert_eq!(app.keys.len(), 1);

        // When opening it, typing and saving
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);
        type_text(&mut app, "!");
        press(&mut app, KeyCode::Char('s'), KeyModifiers::CONTROL);

        // Then the store holds the edited note
        let key = NoteKey::new("Humanities", "Maps", "Geography");
        assert_eq!(
            app.store.load(&key).unwrap().as_deref(),
            Some("<h1>Geography!</h1>")
        );
        assert_eq!(app.status, "Saved Humanities/Maps/Geography");
    }

    #[test]
    fn test_new_note_prompt() {
        let (_dir, mut app) = app_with_notes(&[]);

        press(&mut app, KeyCode::Char('n'), KeyModifiers::CONTROL);
        type_text(&mut app, "Science/Physics/Waves");
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);

        let editor = app.editor.as_ref().unwrap();
        assert_eq!(editor.content(), "<h1>Waves</h1>");
    }

    #[test]
    fn test_new_markdown_note_saves_markdown() {
        // Given an empty notes folder
        let (dir, mut app) = app_with_notes(&[]);

        // When creating a Markdown note and saving it
        press(&mut app, KeyCode::Char('n'), KeyModifiers::CONTROL);
        type_text(&mut app, "Science/Physics/Waves.md");
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);
        press(&mut app, KeyCode::Char('s'), KeyModifiers::CONTROL);

        // Then the file is Markdown and is listed as such
        let path = dir.path().join("Science").join("Physics").join("Waves.md");
        assert_eq!(fs::read_to_string(path).unwrap(), "# Waves\n");
        assert_eq!(app.status, "Saved Science/Physics/Waves.md");
        assert_eq!(app.keys[0].format, NoteFormat::Markdown);
    }

    #[test]
    fn test_paste_is_sanitized() {
        // Given an open note with the caret after the title
        let (_dir, mut app) = app_with_notes(&[("Humanities/Maps/Geography", "<h1>Geography</h1>")]);
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);

        // When pasting markup
        app.paste(" of <b>Asia</b><script>alert(1)</script>");

        // Then the note holds only the allowed text and is dirty
        let editor = app.editor.as_ref().unwrap();
        assert_eq!(editor.content(), "<h1>Geography of Asia</h1>");
        assert!(editor.is_dirty());
        assert_eq!(app.surface.markup(), editor.content());
    }

    #[test]
    fn test_paste_replaces_selection() {
        let (_dir, mut app) = app_with_notes(&[("Humanities/Maps/Geography", "<h1>Geography</h1>")]);
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);
        press(&mut app, KeyCode::Left, KeyModifiers::SHIFT);

        app.paste("ies");

        assert_eq!(
            app.editor.as_ref().unwrap().content(),
            "<h1>Geographies</h1>"
        );
    }

    #[test]
    fn test_invalid_new_note_name_is_reported() {
        let (_dir, mut app) = app_with_notes(&[]);

        press(&mut app, KeyCode::Char('n'), KeyModifiers::CONTROL);
        type_text(&mut app, "just-a-name");
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);

        assert!(app.editor.is_none());
        assert!(app.status.starts_with("Not a note name"));
    }

    #[test]
    fn test_escape_asks_before_discarding() {
        // Given an open note with unsaved changes
        let (_dir, mut app) = app_with_notes(&[("a/b/c", "<h1>c</h1>")]);
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);
        type_text(&mut app, "x");

        // When pressing Esc once, then again
        press(&mut app, KeyCode::Esc, KeyModifiers::NONE);
        assert!(app.editor.is_some());
        press(&mut app, KeyCode::Esc, KeyModifiers::NONE);

        // Then the editor closes without saving
        assert!(app.editor.is_none());
        let key = NoteKey::new("a", "b", "c");
        assert_eq!(app.store.load(&key).unwrap().as_deref(), Some("<h1>c</h1>"));
    }

    #[test]
    fn test_rejected_image_is_reported() {
        let (dir, mut app) = app_with_notes(&[("a/b/c", "<h1>c</h1>")]);
        let text_file = dir.path().join("not-an-image.txt");
        fs::write(&text_file, "hello").unwrap();
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);

        app.insert_image_from(&text_file.to_string_lossy());

        assert!(app.status.starts_with("Invalid or too large image"));
        assert!(!app.editor.as_ref().unwrap().is_dirty());
    }

    #[test]
    fn test_shift_arrows_select_for_bold() {
        // Given an open note with the caret at the end of "Geography"
        let (_dir, mut app) = app_with_notes(&[("Humanities/Maps/Geography", "<h1>Geography</h1>")]);
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);

        // When selecting the last character and bolding it
        press(&mut app, KeyCode::Left, KeyModifiers::SHIFT);
        press(&mut app, KeyCode::Char('b'), KeyModifiers::CONTROL);

        // Then only that character is bold
        assert_eq!(
            app.editor.as_ref().unwrap().content(),
            "<h1>Geograph<strong>y</strong></h1>"
        );
    }
}
