use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use studydesk_engine::{Cmd, ListKind, NoteFormat};

/// Caret motions in the editor pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Quit,
    NextNote,
    PreviousNote,
    OpenNote,
    NewNote,
    Back,
    ToggleTheme,
    ToggleSidebar,
    Edit(Cmd),
    Move { motion: Motion, extend: bool },
    PromptImage,
    Save,
    Export(NoteFormat),
}

/// Keys while browsing the note list.
pub fn list_action(key: KeyEvent) -> Option<Action> {
    if let Some(action) = global_action(key) {
        return Some(action);
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('n') if ctrl => Some(Action::NewNote),
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Down | KeyCode::Char('j') => Some(Action::NextNote),
        KeyCode::Up | KeyCode::Char('k') => Some(Action::PreviousNote),
        KeyCode::Enter => Some(Action::OpenNote),
        _ => None,
    }
}

/// Keys while a note is open.
pub fn editor_action(key: KeyEvent) -> Option<Action> {
    if let Some(action) = global_action(key) {
        return Some(action);
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    let extend = key.modifiers.contains(KeyModifiers::SHIFT);

    let action = match key.code {
        KeyCode::Char('b') if ctrl => Action::Edit(Cmd::ToggleBold),
        KeyCode::Char('t') if ctrl => Action::Edit(Cmd::ToggleItalic),
        KeyCode::Char('l') if ctrl => Action::Edit(Cmd::ToggleList {
            kind: ListKind::Bullet,
        }),
        KeyCode::Char('o') if ctrl => Action::Edit(Cmd::ToggleList {
            kind: ListKind::Numbered,
        }),
        KeyCode::Char('g') if ctrl => Action::PromptImage,
        KeyCode::Char('s') if ctrl => Action::Save,
        KeyCode::Char('e') if ctrl => Action::Export(NoteFormat::Html),
        KeyCode::Char('d') if ctrl => Action::Export(NoteFormat::Markdown),
        KeyCode::Char('n') if ctrl => Action::NewNote,
        KeyCode::Char('0') if alt => Action::Edit(Cmd::SetParagraph),
        KeyCode::Char(c @ '1'..='3') if alt => Action::Edit(Cmd::SetHeading {
            level: c as u8 - b'0',
        }),
        KeyCode::Enter if alt => Action::Edit(Cmd::SplitBlock),
        KeyCode::Char(_) if ctrl || alt => return None,
        KeyCode::Char(c) => Action::Edit(Cmd::InsertText {
            text: c.to_string(),
        }),
        KeyCode::Enter => Action::Edit(Cmd::InsertLineBreak),
        KeyCode::Backspace => Action::Edit(Cmd::DeleteBackward),
        KeyCode::Delete => Action::Edit(Cmd::DeleteForward),
        KeyCode::Left => Action::Move {
            motion: Motion::Left,
            extend,
        },
        KeyCode::Right => Action::Move {
            motion: Motion::Right,
            extend,
        },
        KeyCode::Up => Action::Move {
            motion: Motion::Up,
            extend,
        },
        KeyCode::Down => Action::Move {
            motion: Motion::Down,
            extend,
        },
        KeyCode::Esc => Action::Back,
        _ => return None,
    };
    Some(action)
}

fn global_action(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::F(2) => Some(Action::ToggleTheme),
        KeyCode::F(3) => Some(Action::ToggleSidebar),
        _ => None,
    }
}
