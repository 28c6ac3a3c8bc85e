//! TUI rendering with ratatui

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use super::{body_layout, centered_rect, format_duration, main_layout, App};
use crate::agent::{Agent, AgentStatus};
use crate::keys::HELP;
use crate::reconcile::StatusTab;
use crate::store::DurableStore;
use chrono::Utc;

const SPARK_BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render the entire application
pub fn render<S: DurableStore>(frame: &mut Frame, app: &App<S>) {
    let chunks = main_layout(frame.area());
    render_header(frame, app, chunks[0]);
    render_tabs(frame, app, chunks[1]);

    let body = body_layout(chunks[2]);
    render_agents(frame, app, body[0]);
    render_detail(frame, app, body[1]);
    render_feed(frame, app, body[2]);

    render_status(frame, app, chunks[3]);

    if app.show_help {
        render_help(frame);
    }
}

/// Icon and color for an agent status
pub fn status_display(status: AgentStatus) -> (&'static str, Color) {
    match status {
        AgentStatus::Active => ("●", Color::Green),
        AgentStatus::Queued => ("◌", Color::Yellow),
        AgentStatus::Completed => ("✓", Color::Gray),
        AgentStatus::Failed => ("✗", Color::Red),
    }
}

/// Text sparkline scaled to the largest value
pub fn sparkline(values: &[u64]) -> String {
    let max = values.iter().copied().max().unwrap_or(0);
    values
        .iter()
        .map(|v| {
            if max == 0 {
                SPARK_BARS[0]
            } else {
                let idx = (*v as u128 * (SPARK_BARS.len() as u128 - 1) / max as u128) as usize;
                SPARK_BARS[idx]
            }
        })
        .collect()
}

fn render_header<S: DurableStore>(frame: &mut Frame, app: &App<S>, area: Rect) {
    let base = Style::default().fg(Color::White).bg(Color::DarkGray);
    let muted = Style::default().fg(Color::Gray).bg(Color::DarkGray);

    let mut spans = vec![
        Span::styled(" Fleetdeck ", base.add_modifier(Modifier::BOLD)),
        Span::styled(format!(" {} agents ", app.fleet.agents().len()), base),
    ];

    let attention = app.attention_count();
    if attention > 0 {
        spans.push(Span::styled(
            format!(" {} need attention ", attention),
            Style::default().fg(Color::Red).bg(Color::DarkGray),
        ));
    }

    let link = if app.link.connected {
        Span::styled(" ● live ", Style::default().fg(Color::Green).bg(Color::DarkGray))
    } else {
        Span::styled(" ○ offline ", muted)
    };
    spans.push(link);
    if app.link.push_connected {
        spans.push(Span::styled(" push ", base));
    }
    if app.link.refreshing {
        spans.push(Span::styled(" ⟳ ", muted));
    }
    if app.fleet.is_demo() {
        spans.push(Span::styled(" DEMO ", Style::default().fg(Color::Black).bg(Color::Yellow)));
    }
    if app.dispatcher.is_processing() {
        spans.push(Span::styled(" processing… ", Style::default().fg(Color::Yellow).bg(Color::DarkGray)));
    }
    spans.push(Span::styled(
        format!(" {} tokens ", app.fleet.total_tokens()),
        muted,
    ));

    frame.render_widget(Paragraph::new(Line::from(spans)).style(base), area);
}

fn render_tabs<S: DurableStore>(frame: &mut Frame, app: &App<S>, area: Rect) {
    let filters = app.reconciler.filters();
    let mut spans = Vec::new();
    for tab in StatusTab::ALL {
        let style = if tab == filters.tab {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(format!(" {} ", app.tab_badge(tab)), style));
    }

    if let Some(priority) = filters.priority {
        spans.push(Span::styled(format!("  p:{}", priority), Style::default().fg(Color::Magenta)));
    }
    if let Some(tag) = &filters.tag {
        spans.push(Span::styled(format!("  #{}", tag), Style::default().fg(Color::Magenta)));
    }

    if app.search_focused || !filters.text.is_empty() {
        let cursor = if app.search_focused { "▏" } else { "" };
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("/{}{}", filters.text, cursor),
            Style::default().fg(Color::Yellow),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_agents<S: DurableStore>(frame: &mut Frame, app: &App<S>, area: Rect) {
    let rows = app.rows();
    let block = Block::default()
        .title(format!(" Agents ({}) ", rows.len()))
        .borders(Borders::ALL);

    if rows.is_empty() {
        let message = if app.reconciler.filters().is_unfiltered() {
            "No agents reported by the gateway."
        } else {
            "No agents match the current filter."
        };
        let empty = Paragraph::new(message)
            .style(Style::default().fg(Color::Gray))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let now = Utc::now();
    let items: Vec<ListItem> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let agent = row.agent;
            let (icon, color) = status_display(agent.status);
            let marker = if i == app.cursor { "▶ " } else { "  " };
            let check = if row.selected { "[x] " } else { "[ ] " };
            let age = format_duration(now - agent.updated_at);

            let mut lines = vec![Line::from(vec![
                Span::raw(marker),
                Span::styled(check, Style::default().fg(Color::Cyan)),
                Span::styled(icon, Style::default().fg(color)),
                Span::raw(" "),
                Span::styled(agent.task.clone(), Style::default().add_modifier(Modifier::BOLD)),
                Span::raw("  "),
                Span::styled(agent.status.as_str(), Style::default().fg(color)),
                Span::raw("  "),
                Span::styled(age, Style::default().fg(Color::DarkGray)),
            ])];
            if !row.collapsed {
                let progress = agent.latest_progress().unwrap_or_default().to_string();
                lines.push(Line::from(Span::styled(
                    format!("      └ {}", progress),
                    Style::default().fg(Color::DarkGray),
                )));
            }
            ListItem::new(lines)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray));
    let mut state = ListState::default();
    state.select(Some(app.cursor));
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_detail<S: DurableStore>(frame: &mut Frame, app: &App<S>, area: Rect) {
    let Some(agent) = app.current() else {
        let block = Block::default().title(" Detail ").borders(Borders::ALL);
        frame.render_widget(Paragraph::new("").block(block), area);
        return;
    };
    let paragraph = Paragraph::new(detail_lines(agent))
        .wrap(Wrap { trim: true })
        .block(Block::default().title(format!(" {} ", agent.id)).borders(Borders::ALL));
    frame.render_widget(paragraph, area);
}

fn detail_lines(agent: &Agent) -> Vec<Line<'static>> {
    let label = Style::default().fg(Color::DarkGray);
    let (icon, color) = status_display(agent.status);
    let now = Utc::now();
    let trend: Vec<u64> = agent.token_history.iter().map(|s| s.tokens).collect();

    let mut lines = vec![
        Line::from(Span::styled(agent.task.clone(), Style::default().add_modifier(Modifier::BOLD))),
        Line::from(vec![
            Span::styled("status   ", label),
            Span::styled(format!("{} {}", icon, agent.status), Style::default().fg(color)),
            Span::raw(if agent.archived { "  (archived)" } else { "" }),
        ]),
        Line::from(vec![Span::styled("model    ", label), Span::raw(agent.model.clone())]),
        Line::from(vec![
            Span::styled("tokens   ", label),
            Span::raw(format!("{} ", agent.tokens)),
            Span::styled(sparkline(&trend), Style::default().fg(Color::Cyan)),
        ]),
        Line::from(vec![
            Span::styled("age      ", label),
            Span::raw(format!(
                "started {} ago, updated {} ago",
                format_duration(now - agent.created_at),
                format_duration(now - agent.updated_at),
            )),
        ]),
        Line::from(vec![
            Span::styled("priority ", label),
            Span::raw(agent.priority.as_str()),
        ]),
    ];
    if !agent.tags.is_empty() {
        lines.push(Line::from(vec![
            Span::styled("tags     ", label),
            Span::raw(agent.tags.join(", ")),
        ]));
    }
    if !agent.dependencies.is_empty() {
        lines.push(Line::from(vec![
            Span::styled("needs    ", label),
            Span::raw(agent.dependencies.join(", ")),
        ]));
    }
    if let Some(eta) = agent.estimated_completion {
        lines.push(Line::from(vec![
            Span::styled("eta      ", label),
            Span::raw(eta.format("%H:%M").to_string()),
        ]));
    }
    lines.push(Line::from(""));
    for entry in &agent.progress {
        lines.push(Line::from(format!("• {}", entry)));
    }
    lines
}

fn render_feed<S: DurableStore>(frame: &mut Frame, app: &App<S>, area: Rect) {
    let paused = if app.feed.is_auto_scroll() { "" } else { " [paused]" };
    let block = Block::default()
        .title(format!(" Activity: {}{} ", app.feed.filter().label(), paused))
        .borders(Borders::ALL);

    let height = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = app
        .feed
        .visible(height)
        .into_iter()
        .map(|event| {
            let color = match event.kind {
                crate::activity::ActivityKind::Failed => Color::Red,
                crate::activity::ActivityKind::Completed => Color::Green,
                crate::activity::ActivityKind::Spawned => Color::Cyan,
                _ => Color::Gray,
            };
            Line::from(vec![
                Span::styled(
                    event.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S ").to_string(),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(event.description.clone(), Style::default().fg(color)),
            ])
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_status<S: DurableStore>(frame: &mut Frame, app: &App<S>, area: Rect) {
    let (text, style) = match app.batch_error() {
        Some(error) => (error, Style::default().fg(Color::White).bg(Color::Red)),
        None => (
            app.status_message.clone().unwrap_or_default(),
            Style::default().fg(Color::White).bg(Color::Blue),
        ),
    };
    frame.render_widget(Paragraph::new(format!(" {} ", text)).style(style), area);
}

fn render_help(frame: &mut Frame) {
    let lines: Vec<Line> = HELP
        .iter()
        .map(|(keys, command)| {
            Line::from(vec![
                Span::styled(format!("{:>12}  ", keys), Style::default().fg(Color::Cyan)),
                Span::raw(command.describe()),
            ])
        })
        .collect();
    let area = centered_rect(frame.area(), 44, lines.len() as u16 + 2);
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines).block(Block::default().title(" Keys ").borders(Borders::ALL)),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparkline_scales_to_max() {
        assert_eq!(sparkline(&[0, 50, 100]), "▁▄█");
        assert_eq!(sparkline(&[0, 0]), "▁▁");
        assert_eq!(sparkline(&[]), "");
    }

    #[test]
    fn test_centered_rect_fits() {
        let area = Rect::new(0, 0, 20, 10);
        let popup = centered_rect(area, 40, 4);
        assert_eq!(popup, Rect::new(0, 3, 20, 4));
    }
}
