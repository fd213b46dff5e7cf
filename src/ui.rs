use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use crate::app::{App, ChatRole, InputMode, ProfileField, Screen};
use crate::theme::Palette;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    let palette = app.theme.palette();

    let [header_area, body_area, status_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, &palette, frame, header_area);

    match app.screen {
        Screen::Chat => render_chat(app, &palette, frame, body_area),
        Screen::Profiles => render_profiles(app, &palette, frame, body_area),
        Screen::Memories => render_memories(app, &palette, frame, body_area),
        Screen::Workspace => render_workspace(app, &palette, frame, body_area),
        Screen::Training => render_training(app, &palette, frame, body_area),
        Screen::Settings => render_settings(app, &palette, frame, body_area),
    }

    render_status(app, &palette, frame, status_area);
    render_footer(app, &palette, frame, footer_area);

    if app.profile_form.is_some() {
        render_profile_form(app, &palette, frame, area);
    } else if app.prompt.is_some() {
        render_prompt(app, &palette, frame, area);
    }
}

fn render_header(app: &App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let health = if app.backend_online {
        Span::styled(" ● online ", Style::default().fg(palette.user))
    } else {
        Span::styled(" ● offline ", Style::default().fg(palette.error))
    };

    let greeting = match &app.display_name {
        Some(name) => format!(" {} ", name),
        None => String::new(),
    };

    let profile = app
        .active_profile_name()
        .map(|name| format!("[{}] ", name))
        .unwrap_or_default();

    let mut spans = vec![
        Span::styled(" Companion ", Style::default().fg(palette.accent).bold()),
        health,
        Span::styled(profile, Style::default().fg(palette.text)),
        Span::styled(greeting, Style::default().fg(palette.dim)),
    ];
    if let Some(version) = &app.backend_version {
        spans.push(Span::styled(
            format!("backend v{} ", version),
            Style::default().fg(palette.dim),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(palette.bar_bg));
    frame.render_widget(header, area);
}

fn render_status(app: &App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let Some(status) = &app.status else {
        return;
    };

    let style = if status.error {
        Style::default().fg(palette.error)
    } else {
        Style::default().fg(palette.accent)
    };
    let line = Paragraph::new(Line::from(Span::styled(format!(" {}", status.text), style)));
    frame.render_widget(line, area);
}

fn render_footer(app: &App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(palette.bar_bg).fg(palette.bar_fg);
    let label_style = Style::default().fg(palette.dim);

    let mut hints: Vec<Span> = Vec::new();
    for screen in Screen::all() {
        let n = match screen {
            Screen::Chat => "1",
            Screen::Profiles => "2",
            Screen::Memories => "3",
            Screen::Workspace => "4",
            Screen::Training => "5",
            Screen::Settings => "6",
        };
        if screen == app.screen {
            hints.push(Span::styled(
                format!(" {}:{} ", n, screen.title()),
                Style::default().fg(palette.accent).add_modifier(Modifier::BOLD),
            ));
        } else {
            hints.push(Span::styled(format!(" {}:{} ", n, screen.title()), label_style));
        }
    }
    hints.push(Span::raw("  "));

    let screen_hints: &[(&str, &str)] = match (app.screen, app.input_mode) {
        (Screen::Chat, InputMode::Normal) => &[("i", "type"), ("j/k", "scroll"), ("q", "quit")],
        (Screen::Chat, InputMode::Editing) => &[("Enter", "send"), ("Esc", "done")],
        (Screen::Profiles, _) => &[
            ("Enter", "activate"),
            ("n", "new"),
            ("e", "edit"),
            ("d", "delete"),
            ("r", "reload"),
        ],
        (Screen::Memories, _) => &[("n", "new"), ("d", "delete"), ("r", "reload")],
        (Screen::Workspace, _) => &[
            ("Enter", "open"),
            ("h", "up"),
            ("n", "mkdir"),
            ("a", "new file"),
            ("u", "upload"),
            ("d", "delete"),
        ],
        (Screen::Training, _) => &[
            ("u", "upload"),
            ("s", "start"),
            ("c", "cancel"),
            ("d", "delete"),
            ("r", "reload"),
        ],
        (Screen::Settings, _) => &[
            ("Enter", "select model"),
            ("t", "theme"),
            ("S", "streaming"),
            ("n", "name"),
        ],
    };
    for (key, label) in screen_hints {
        hints.push(Span::styled(format!(" {} ", key), key_style));
        hints.push(Span::styled(format!(" {} ", label), label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}

// Chat

/// Convert `**bold**` runs into styled spans; everything else renders raw.
fn styled_reply_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        if let Some(len) = rest[start + 2..].find("**") {
            if start > 0 {
                spans.push(Span::raw(rest[..start].to_string()));
            }
            spans.push(Span::styled(
                rest[start + 2..start + 2 + len].to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
            rest = &rest[start + 2 + len + 2..];
        } else {
            break;
        }
    }
    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn render_chat(app: &mut App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let [transcript_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(area);

    // Sizes feed the scroll-to-bottom math.
    app.chat_height = transcript_area.height.saturating_sub(2);
    app.chat_width = transcript_area.width.saturating_sub(2);

    let mut lines: Vec<Line> = Vec::new();
    for msg in &app.messages {
        match msg.role {
            ChatRole::User => {
                let who = app.display_name.as_deref().unwrap_or("You");
                lines.push(Line::from(Span::styled(
                    format!("{}:", who),
                    Style::default().fg(palette.user).bold(),
                )));
                for line in msg.content.lines() {
                    lines.push(Line::from(Span::raw(line.to_string())));
                }
            }
            ChatRole::Assistant => {
                lines.push(Line::from(Span::styled(
                    "Assistant:",
                    Style::default().fg(palette.assistant).bold(),
                )));
                for line in msg.content.lines() {
                    lines.push(styled_reply_line(line));
                }
            }
        }
        lines.push(Line::default());
    }

    if app.is_waiting() {
        lines.push(Line::from(Span::styled(
            "Assistant:",
            Style::default().fg(palette.assistant).bold(),
        )));
        match app.pending_reply() {
            Some(buffer) => {
                for line in buffer.lines() {
                    lines.push(styled_reply_line(line));
                }
            }
            None => {
                let dots = ".".repeat(app.spinner_frame as usize + 1);
                lines.push(Line::from(Span::styled(
                    format!("Thinking{}", dots),
                    Style::default().fg(palette.dim),
                )));
            }
        }
    }

    let transcript = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(" Conversation "))
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(transcript, transcript_area);

    let input_style = match app.input_mode {
        InputMode::Editing => Style::default().fg(palette.accent),
        InputMode::Normal => Style::default().fg(palette.dim),
    };
    let input = Paragraph::new(app.chat_input.as_str())
        .style(Style::default().fg(palette.text))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(input_style)
                .title(" Message "),
        );
    frame.render_widget(input, input_area);

    if app.input_mode == InputMode::Editing {
        let x = input_area.x + 1 + app.chat_cursor as u16;
        let y = input_area.y + 1;
        frame.set_cursor_position((x.min(input_area.right().saturating_sub(2)), y));
    }
}

// Profiles

fn render_profiles(app: &mut App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let [list_area, detail_area] =
        Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)]).areas(area);

    let items: Vec<ListItem> = app
        .profiles
        .iter()
        .map(|p| {
            let marker = if p.active { "● " } else { "  " };
            let style = if p.active {
                Style::default().fg(palette.user)
            } else {
                Style::default().fg(palette.text)
            };
            ListItem::new(Line::from(Span::styled(
                format!("{}{}", marker, p.name),
                style,
            )))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" Profiles "))
        .highlight_style(Style::default().bg(palette.bar_bg).add_modifier(Modifier::BOLD));
    frame.render_stateful_widget(list, list_area, &mut app.profile_state);

    let detail = match app.selected_profile() {
        Some(p) => {
            let mut lines = vec![
                Line::from(Span::styled(
                    p.name.clone(),
                    Style::default().fg(palette.accent).bold(),
                )),
                Line::default(),
                Line::from(Span::raw(p.description.clone())),
            ];
            if let Some(model_path) = &p.model_path {
                lines.push(Line::default());
                lines.push(Line::from(Span::styled(
                    format!("model: {}", model_path),
                    Style::default().fg(palette.dim),
                )));
            }
            Text::from(lines)
        }
        None => Text::from("No profile selected"),
    };
    let detail = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Details "))
        .wrap(Wrap { trim: false });
    frame.render_widget(detail, detail_area);
}

// Memories

fn render_memories(app: &mut App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let items: Vec<ListItem> = app
        .memories
        .iter()
        .map(|m| {
            let when = m.created_at.as_deref().unwrap_or("");
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", when), Style::default().fg(palette.dim)),
                Span::raw(m.content.clone()),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" Memories "))
        .highlight_style(Style::default().bg(palette.bar_bg).add_modifier(Modifier::BOLD));
    frame.render_stateful_widget(list, area, &mut app.memory_state);
}

// Workspace

fn render_workspace(app: &mut App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let items: Vec<ListItem> = app
        .workspace_entries
        .iter()
        .map(|e| {
            if e.is_dir {
                ListItem::new(Line::from(Span::styled(
                    format!("{}/", e.name),
                    Style::default().fg(palette.accent),
                )))
            } else {
                let size = e
                    .size
                    .map(|s| format!("  {} B", s))
                    .unwrap_or_default();
                ListItem::new(Line::from(vec![
                    Span::raw(e.name.clone()),
                    Span::styled(size, Style::default().fg(palette.dim)),
                ]))
            }
        })
        .collect();

    let title = format!(" Workspace {} ", app.workspace_path);
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(palette.bar_bg).add_modifier(Modifier::BOLD));
    frame.render_stateful_widget(list, area, &mut app.workspace_state);

    if let Some((path, content)) = &app.file_preview {
        let popup = centered_rect(70, 70, frame.area());
        frame.render_widget(Clear, popup);
        let preview = Paragraph::new(content.as_str())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!(" {} (Esc to close) ", path)),
            )
            .wrap(Wrap { trim: false });
        frame.render_widget(preview, popup);
    }
}

// Training

fn render_training(app: &mut App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let [data_area, progress_area] =
        Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)]).areas(area);

    let items: Vec<ListItem> = app
        .datasets
        .iter()
        .map(|d| {
            let size = d.size.map(|s| format!("  {} B", s)).unwrap_or_default();
            ListItem::new(Line::from(vec![
                Span::raw(d.filename.clone()),
                Span::styled(size, Style::default().fg(palette.dim)),
            ]))
        })
        .collect();
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" Datasets "))
        .highlight_style(Style::default().bg(palette.bar_bg).add_modifier(Modifier::BOLD));
    frame.render_stateful_widget(list, data_area, &mut app.dataset_state);

    let mut lines: Vec<Line> = Vec::new();
    match &app.training_status {
        Some(status) => {
            let state_style = if status.is_running() {
                Style::default().fg(palette.user)
            } else {
                Style::default().fg(palette.dim)
            };
            lines.push(Line::from(vec![
                Span::raw("state: "),
                Span::styled(status.state.clone(), state_style),
            ]));
            if let Some(progress) = status.progress {
                lines.push(Line::from(Span::raw(format!(
                    "progress: {:.0}%",
                    progress * 100.0
                ))));
            }
            if let Some(message) = &status.message {
                lines.push(Line::from(Span::styled(
                    message.clone(),
                    Style::default().fg(palette.dim),
                )));
            }
        }
        None => lines.push(Line::from("No training run")),
    }
    lines.push(Line::default());
    for line in app.training_log.iter().rev().take(32).rev() {
        lines.push(Line::from(Span::styled(
            line.clone(),
            Style::default().fg(palette.dim),
        )));
    }

    let progress = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(" Training "))
        .wrap(Wrap { trim: false });
    frame.render_widget(progress, progress_area);
}

// Settings

fn render_settings(app: &mut App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let [models_area, options_area] =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(area);

    let items: Vec<ListItem> = app
        .models
        .iter()
        .map(|m| {
            let marker = if m.loaded { "● " } else { "  " };
            let style = if m.loaded {
                Style::default().fg(palette.user)
            } else {
                Style::default().fg(palette.text)
            };
            ListItem::new(Line::from(Span::styled(
                format!("{}{}", marker, m.name),
                style,
            )))
        })
        .collect();
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" Models "))
        .highlight_style(Style::default().bg(palette.bar_bg).add_modifier(Modifier::BOLD));
    frame.render_stateful_widget(list, models_area, &mut app.model_state);

    let streaming = if app.streaming_enabled { "on" } else { "off" };
    let name = app.display_name.as_deref().unwrap_or("(not set)");
    let options = Paragraph::new(Text::from(vec![
        Line::from(vec![
            Span::raw("Theme: "),
            Span::styled(
                app.theme.display_name(),
                Style::default().fg(palette.accent),
            ),
        ]),
        Line::from(vec![Span::raw("Streaming replies: "), Span::raw(streaming)]),
        Line::from(vec![Span::raw("Display name: "), Span::raw(name.to_string())]),
    ]))
    .block(Block::default().borders(Borders::ALL).title(" Options "));
    frame.render_widget(options, options_area);
}

// Popups

fn render_prompt(app: &App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let Some(prompt) = &app.prompt else {
        return;
    };

    let popup = centered_rect(60, 20, area);
    let popup = Rect {
        height: 3.min(popup.height),
        ..popup
    };
    frame.render_widget(Clear, popup);

    let input = Paragraph::new(prompt.value.as_str())
        .style(Style::default().fg(palette.text))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.accent))
                .title(format!(" {} ", prompt.kind.title())),
        );
    frame.render_widget(input, popup);
    frame.set_cursor_position((popup.x + 1 + prompt.cursor as u16, popup.y + 1));
}

fn render_profile_form(app: &App, palette: &Palette, frame: &mut Frame, area: Rect) {
    let Some(form) = &app.profile_form else {
        return;
    };

    let popup = centered_rect(60, 30, area);
    let popup = Rect {
        height: 8.min(popup.height),
        ..popup
    };
    frame.render_widget(Clear, popup);

    let title = if form.id.is_some() {
        " Edit profile "
    } else {
        " New profile "
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.accent))
        .title(title);
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let field_style = |field: ProfileField| {
        if form.field == field {
            Style::default().fg(palette.accent)
        } else {
            Style::default().fg(palette.dim)
        }
    };

    let [name_area, desc_area, hint_area] = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(2),
        Constraint::Length(1),
    ])
    .areas(inner);

    frame.render_widget(
        Paragraph::new(Text::from(vec![
            Line::from(Span::styled("Name", field_style(ProfileField::Name))),
            Line::from(Span::raw(form.name.clone())),
        ])),
        name_area,
    );
    frame.render_widget(
        Paragraph::new(Text::from(vec![
            Line::from(Span::styled(
                "Description",
                field_style(ProfileField::Description),
            )),
            Line::from(Span::raw(form.description.clone())),
        ])),
        desc_area,
    );
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            "Tab: switch field   Enter: save   Esc: cancel",
            Style::default().fg(palette.dim),
        )))
        .alignment(Alignment::Center),
        hint_area,
    );

    let field_area = match form.field {
        ProfileField::Name => name_area,
        ProfileField::Description => desc_area,
    };
    frame.set_cursor_position((field_area.x + form.cursor as u16, field_area.y + 1));
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let [_, vert, _] = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .areas(r);
    let [_, horiz, _] = Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .areas(vert);
    horiz
}
