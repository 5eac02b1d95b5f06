use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use deepdive_core::Region;
use ratatui::layout::Rect;

use crate::app::{App, Focus};
use crate::tui::AppEvent;

const WHEEL_LINES: usize = 3;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(width, height) => {
            tracing::debug!(width, height, "terminal resized");
        }
        AppEvent::Tick => app.tick_animation(),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Global keys that work in any focus
    match key.code {
        KeyCode::Char('c') if ctrl => {
            app.should_quit = true;
            return;
        }
        KeyCode::Char('e') if ctrl => {
            app.perform(crate::transcript::Action::ConfirmSelection);
            return;
        }
        KeyCode::Char('d') if ctrl => {
            app.toggle_panel();
            return;
        }
        KeyCode::Char('r') if ctrl => {
            app.session.retry_definition();
            return;
        }
        KeyCode::Esc => {
            if app.session.popup().is_some() || app.drag.is_some() {
                app.session.dismiss_popup();
                app.clear_selection();
            } else if app.session.panel().is_open() {
                app.close_panel();
            }
            return;
        }
        KeyCode::Tab => {
            app.focus = match app.focus {
                Focus::Input if app.session.panel().is_open() => Focus::Panel,
                _ => Focus::Input,
            };
            return;
        }
        KeyCode::PageUp => {
            let page = app.chat_area.map(|r| r.height as usize).unwrap_or(10);
            app.scroll_up(page.saturating_sub(1).max(1));
            return;
        }
        KeyCode::PageDown => {
            let page = app.chat_area.map(|r| r.height as usize).unwrap_or(10);
            app.scroll_down(page.saturating_sub(1).max(1));
            return;
        }
        _ => {}
    }

    match app.focus {
        Focus::Input => handle_input_key(app, key),
        Focus::Panel => handle_panel_key(app, key),
    }
}

fn handle_input_key(app: &mut App, key: KeyEvent) {
    // Read-only while an answer is on its way
    let edits = matches!(
        key.code,
        KeyCode::Char(_) | KeyCode::Backspace | KeyCode::Delete | KeyCode::Enter
    );
    if edits && app.session.conversation().is_searching() {
        return;
    }

    match key.code {
        KeyCode::Enter => {
            app.send();
        }
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let input = app.session.input_mut();
                let byte_pos = char_to_byte_index(input, app.input_cursor);
                input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let cursor = app.input_cursor;
            let input = app.session.input_mut();
            if cursor < input.chars().count() {
                let byte_pos = char_to_byte_index(input, cursor);
                input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.session.input().chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.session.input().chars().count();
        }
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),
        KeyCode::Char(c) if !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) => {
            let cursor = app.input_cursor;
            let input = app.session.input_mut();
            let byte_pos = char_to_byte_index(input, cursor);
            input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}

fn handle_panel_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.related_next(),
        KeyCode::Char('k') | KeyCode::Up => app.related_prev(),
        KeyCode::Enter => app.explore_selected_related(),
        KeyCode::Char('r') => {
            app.session.retry_definition();
        }
        KeyCode::Char('q') => app.close_panel(),
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

/// Screen region under a cell, as seen by selection subscribers
fn region_at(app: &App, x: u16, y: u16) -> Region {
    let inside = |area: Option<Rect>| area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    if inside(app.chat_area) {
        Region::Transcript
    } else if inside(app.panel_area) {
        Region::DefinitionPanel
    } else if inside(app.input_area) {
        Region::Input
    } else {
        Region::Outside
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_panel = app.panel_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let on_popup = app.popup_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            if on_popup {
                app.perform(crate::transcript::Action::ConfirmSelection);
            } else if in_panel {
                app.clear_selection();
                let target = app
                    .panel_targets
                    .iter()
                    .find(|(rect, _)| point_in_rect(x, y, *rect))
                    .map(|(_, action)| action.clone());
                if let Some(action) = target {
                    app.perform(action);
                }
            } else if in_chat {
                let Some(pos) = app.chat_pos(x, y) else {
                    return;
                };
                match app.transcript_action(pos) {
                    Some(action) => {
                        app.clear_selection();
                        app.perform(action);
                    }
                    None => app.begin_drag(pos),
                }
            } else {
                app.clear_selection();
            }
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            if app.drag.is_some() {
                if let Some(pos) = app.chat_pos(x, y) {
                    let region = region_at(app, x, y);
                    app.extend_drag(pos, region);
                }
            }
        }
        MouseEventKind::ScrollDown => {
            if in_chat {
                app.scroll_down(WHEEL_LINES);
            } else if in_panel {
                app.related_next();
            }
        }
        MouseEventKind::ScrollUp => {
            if in_chat {
                app.scroll_up(WHEEL_LINES);
            } else if in_panel {
                app.related_prev();
            }
        }
        _ => {}
    }
}
