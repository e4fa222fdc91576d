use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, List, ListItem, Paragraph, Row,
        Table, Tabs},
};

use crate::app::{App, InputMode, Tab};
use crate::config::Theme;
use crate::data::QuoteSnapshot;
use crate::forecast::TargetSource;

/// Colors that differ between the two themes.
struct Palette {
    accent: Color,
    text: Color,
    dim: Color,
}

fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Dark => Palette {
            accent: Color::Cyan,
            text: Color::White,
            dim: Color::Gray,
        },
        Theme::Light => Palette {
            accent: Color::Blue,
            text: Color::Black,
            dim: Color::DarkGray,
        },
    }
}

fn change_color(change: f64) -> Color {
    if change >= 0.0 { Color::Green } else { Color::Red }
}

fn quote_spans(quote: &QuoteSnapshot, pal: &Palette) -> Vec<Span<'static>> {
    if quote.current <= 0.0 {
        return vec![Span::styled("no data", Style::default().fg(pal.dim))];
    }
    vec![
        Span::styled(
            format!("${:.2} ", quote.current),
            Style::default().fg(pal.text).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("{:+.2} ({:+.2}%)", quote.change, quote.change_pct),
            Style::default().fg(change_color(quote.change)),
        ),
    ]
}

pub fn render(f: &mut Frame, app: &App) {
    let pal = palette(app.theme);
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    render_header(f, app, &pal, layout[0]);
    render_tabs(f, app, &pal, layout[1]);

    match app.tab {
        Tab::Lookup => render_lookup(f, app, &pal, layout[2]),
        Tab::Forecast => render_forecast(f, app, &pal, layout[2]),
        Tab::HighYield => render_high_yield(f, app, &pal, layout[2]),
        Tab::Movers => render_movers(f, app, &pal, layout[2]),
        Tab::News => render_news(f, app, &pal, layout[2]),
        Tab::BondEtfs => render_symbol_list(f, &app.bond_rows, "Bond ETFs", &pal, layout[2]),
        Tab::DividendEtfs => {
            render_symbol_list(f, &app.dividend_rows, "Dividend ETFs", &pal, layout[2])
        }
        Tab::Holdings => render_holdings(f, app, &pal, layout[2]),
    }

    render_footer(f, app, &pal, layout[3]);
}

fn render_header(f: &mut Frame, app: &App, pal: &Palette, area: Rect) {
    let mut spans = vec![
        Span::styled(
            " foliodash ",
            Style::default().fg(pal.accent).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::styled(app.theme.as_str(), Style::default().fg(Color::Yellow)),
        Span::raw(" | "),
        Span::styled(
            format!("period {}", app.chart_period.as_str()),
            Style::default().fg(pal.dim),
        ),
    ];

    if let Some(status) = &app.status {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            status.clone(),
            Style::default().fg(Color::Yellow),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn render_tabs(f: &mut Frame, app: &App, pal: &Palette, area: Rect) {
    let titles: Vec<Line> = Tab::ALL.iter().map(|t| Line::from(t.title())).collect();
    let selected = Tab::ALL.iter().position(|t| *t == app.tab).unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .style(Style::default().fg(pal.dim))
        .highlight_style(
            Style::default().fg(pal.accent).add_modifier(Modifier::BOLD),
        )
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(tabs, area);
}

fn render_footer(f: &mut Frame, app: &App, pal: &Palette, area: Rect) {
    let hint = if app.input_mode != InputMode::Idle {
        "Enter: submit | Esc: cancel"
    } else {
        match app.tab {
            Tab::Lookup => "/: search | Up/Down: select | Enter: chart | p: period | Tab: next | t: theme | q: quit",
            Tab::Forecast => "s: symbol | p: period | Tab: next | t: theme | q: quit",
            Tab::Holdings => "a: add lot | r: refresh | Tab: next | t: theme | q: quit",
            _ => "r: refresh | Tab/Shift-Tab: switch | t: theme | q: quit",
        }
    };

    let line = if app.input_mode != InputMode::Idle {
        let label = match app.input_mode {
            InputMode::SearchQuery => "Search",
            InputMode::ForecastSymbol => "Symbol",
            InputMode::AddLot => "Add lot (TICKER SHARES PRICE)",
            InputMode::Idle => "",
        };
        Line::from(vec![
            Span::styled(format!(" {}: ", label), Style::default().fg(pal.accent)),
            Span::styled(app.input.clone(), Style::default().fg(Color::Yellow)),
            Span::styled("_", Style::default().fg(Color::Yellow)),
            Span::raw("   "),
            Span::styled(hint, Style::default().fg(pal.dim)),
        ])
    } else {
        Line::from(vec![
            Span::styled(" Controls: ", Style::default().fg(pal.dim)),
            Span::styled(hint, Style::default().fg(pal.text)),
        ])
    };

    f.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

fn render_lookup(f: &mut Frame, app: &App, pal: &Palette, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(area);

    let items: Vec<ListItem> = app
        .search_results
        .iter()
        .enumerate()
        .map(|(i, (result, quote))| {
            let marker = if i == app.selected_result { "> " } else { "  " };
            let mut spans = vec![
                Span::raw(marker),
                Span::styled(
                    format!("{:<8}", result.symbol),
                    Style::default().fg(pal.accent).add_modifier(Modifier::BOLD),
                ),
            ];
            spans.extend(quote_spans(quote, pal));
            spans.push(Span::styled(
                format!("  {} [{}]", result.name, result.exchange),
                Style::default().fg(pal.dim),
            ));
            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = if items.is_empty() {
        List::new([ListItem::new(Line::from(Span::styled(
            "Press / and type a company name or ticker",
            Style::default().fg(pal.dim),
        )))])
    } else {
        List::new(items)
    };
    f.render_widget(
        list.block(Block::default().borders(Borders::ALL).title(" Matches ")),
        chunks[0],
    );

    render_history_chart(f, app, pal, chunks[1], false);
}

fn render_forecast(f: &mut Frame, app: &App, pal: &Palette, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(75), Constraint::Percentage(25)])
        .split(area);

    render_history_chart(f, app, pal, chunks[0], true);

    let mut info = vec![
        Line::from(Span::styled(
            app.forecast_symbol.clone(),
            Style::default().fg(pal.accent).add_modifier(Modifier::BOLD),
        )),
        Line::from(quote_spans(&app.forecast_quote, pal)),
        Line::from(""),
    ];

    if let Some(path) = &app.forecast {
        let source = match path.source {
            TargetSource::Model => ("model", Color::Yellow),
            TargetSource::Heuristic => ("heuristic", Color::Magenta),
        };
        info.push(Line::from(Span::styled(
            "30-Day Target",
            Style::default().fg(pal.accent).add_modifier(Modifier::BOLD),
        )));
        info.push(Line::from(Span::styled(
            format!("${:.2}", path.target),
            Style::default()
                .fg(change_color(path.target - path.spot))
                .add_modifier(Modifier::BOLD),
        )));
        info.push(Line::from(Span::styled(
            format!("{:+.2}% vs spot", path.target_change_pct()),
            Style::default().fg(change_color(path.target - path.spot)),
        )));
        info.push(Line::from(vec![
            Span::styled("anchor: ", Style::default().fg(pal.dim)),
            Span::styled(source.0, Style::default().fg(source.1)),
        ]));
        info.push(Line::from(""));
        info.push(Line::from(Span::styled(
            "Illustrative only.",
            Style::default().fg(pal.dim),
        )));
        info.push(Line::from(Span::styled(
            "Not a prediction.",
            Style::default().fg(pal.dim),
        )));
    } else {
        info.push(Line::from(Span::styled(
            "Press s to pick a symbol",
            Style::default().fg(pal.dim),
        )));
    }

    f.render_widget(
        Paragraph::new(info).block(Block::default().borders(Borders::ALL).title(" Forecast ")),
        chunks[1],
    );
}

/// Close-price line chart; on the forecast tab the projection and back-cast
/// overlay the history. An empty series renders the placeholder instead.
fn render_history_chart(f: &mut Frame, app: &App, pal: &Palette, area: Rect, with_forecast: bool) {
    let data = if with_forecast {
        app.forecast_history.as_ref()
    } else {
        app.chart.as_ref()
    };

    let Some(data) = data else {
        let message = app
            .chart_placeholder
            .clone()
            .unwrap_or_else(|| "No chart data".to_string());
        let placeholder = Paragraph::new(message)
            .style(Style::default().fg(pal.dim))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title(" Chart "));
        f.render_widget(placeholder, area);
        return;
    };

    let points: Vec<(f64, f64)> = data
        .history
        .iter()
        .enumerate()
        .map(|(i, candle)| (i as f64, candle.close))
        .collect();
    let last_x = points.len().saturating_sub(1) as f64;

    let mut datasets = vec![
        Dataset::default()
            .name(data.symbol.as_str())
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(pal.accent))
            .data(&points),
    ];

    let mut projection_points: Vec<(f64, f64)> = Vec::new();
    let mut backcast_points: Vec<(f64, f64)> = Vec::new();
    let mut x_max = last_x + 1.0;
    let (mut y_min, mut y_max) = data.price_bounds();

    if with_forecast {
        if let Some(path) = &app.forecast {
            projection_points.extend(
                path.projection
                    .iter()
                    .map(|(day, price)| (last_x + day, *price)),
            );
            backcast_points.extend(
                path.backcast
                    .iter()
                    .map(|(day, price)| (last_x + day, *price)),
            );

            for (_, price) in path.projection.iter().chain(path.backcast.iter()) {
                y_min = y_min.min(*price);
                y_max = y_max.max(*price);
            }
            x_max = last_x + path.projection.len() as f64 + 1.0;

            datasets.push(
                Dataset::default()
                    .name("Target path")
                    .marker(symbols::Marker::Braille)
                    .graph_type(GraphType::Line)
                    .style(Style::default().fg(Color::Yellow))
                    .data(&projection_points),
            );
            datasets.push(
                Dataset::default()
                    .name("Backcast")
                    .marker(symbols::Marker::Braille)
                    .graph_type(GraphType::Line)
                    .style(Style::default().fg(Color::Magenta))
                    .data(&backcast_points),
            );
        }
    }

    let period = if with_forecast {
        app.chart_period.daily_overlay()
    } else {
        app.chart_period
    };
    let title = format!(" {} - {} ", data.symbol, period.as_str().to_uppercase());
    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(Span::styled(
                    title,
                    Style::default().fg(pal.accent).add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL),
        )
        .x_axis(
            Axis::default()
                .title("Bars")
                .style(Style::default().fg(pal.dim))
                .bounds([0.0, x_max]),
        )
        .y_axis(
            Axis::default()
                .title("Price")
                .style(Style::default().fg(pal.dim))
                .bounds([y_min * 0.97, y_max * 1.03])
                .labels(vec![
                    Span::styled(format!("{:.1}", y_min), Style::default().fg(pal.dim)),
                    Span::styled(format!("{:.1}", y_max), Style::default().fg(pal.dim)),
                ]),
        );

    f.render_widget(chart, area);
}

fn render_high_yield(f: &mut Frame, app: &App, pal: &Palette, area: Rect) {
    let rows: Vec<Row> = app
        .yield_rows
        .iter()
        .map(|(symbol, desc, quote)| {
            Row::new(vec![
                Span::styled(
                    symbol.to_string(),
                    Style::default().fg(pal.accent).add_modifier(Modifier::BOLD),
                ),
                price_cell(quote, pal),
                change_cell(quote, pal),
                Span::styled(desc.to_string(), Style::default().fg(pal.dim)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(12),
            Constraint::Length(18),
            Constraint::Min(20),
        ],
    )
    .header(header_row(&["Symbol", "Price", "Change", "Note"], pal))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" High Yield Bonds & ETFs "),
    );
    f.render_widget(table, area);
}

fn render_symbol_list(
    f: &mut Frame,
    rows: &[(&'static str, QuoteSnapshot)],
    title: &str,
    pal: &Palette,
    area: Rect,
) {
    let rows: Vec<Row> = rows
        .iter()
        .map(|(symbol, quote)| {
            Row::new(vec![
                Span::styled(
                    symbol.to_string(),
                    Style::default().fg(pal.accent).add_modifier(Modifier::BOLD),
                ),
                price_cell(quote, pal),
                change_cell(quote, pal),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(12),
            Constraint::Min(18),
        ],
    )
    .header(header_row(&["Symbol", "Price", "Change"], pal))
    .block(Block::default().borders(Borders::ALL).title(format!(" {} ", title)));
    f.render_widget(table, area);
}

fn render_movers(f: &mut Frame, app: &App, pal: &Palette, area: Rect) {
    if app.movers.is_empty() {
        let placeholder = Paragraph::new("No movers data")
            .style(Style::default().fg(pal.dim))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title(" Top Movers "));
        f.render_widget(placeholder, area);
        return;
    }

    let rows: Vec<Row> = app
        .movers
        .iter()
        .enumerate()
        .map(|(i, mover)| {
            Row::new(vec![
                Span::styled(format!("{}", i + 1), Style::default().fg(pal.dim)),
                Span::styled(
                    mover.symbol.clone(),
                    Style::default().fg(pal.accent).add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!("{:+.2}%", mover.change_pct),
                    Style::default().fg(change_color(mover.change_pct)),
                ),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Length(8),
            Constraint::Min(10),
        ],
    )
    .header(header_row(&["#", "Symbol", "2-Day Change"], pal))
    .block(Block::default().borders(Borders::ALL).title(" Top Movers "));
    f.render_widget(table, area);
}

fn render_news(f: &mut Frame, app: &App, pal: &Palette, area: Rect) {
    if app.news.is_empty() {
        let placeholder = Paragraph::new("No news")
            .style(Style::default().fg(pal.dim))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title(" News "));
        f.render_widget(placeholder, area);
        return;
    }

    let items: Vec<ListItem> = app
        .news
        .iter()
        .map(|item| {
            ListItem::new(vec![
                Line::from(Span::styled(
                    item.title.clone(),
                    Style::default().fg(pal.text).add_modifier(Modifier::BOLD),
                )),
                Line::from(vec![
                    Span::styled(item.publisher.clone(), Style::default().fg(pal.dim)),
                    Span::raw("  "),
                    Span::styled(item.link.clone(), Style::default().fg(pal.accent)),
                ]),
                Line::from(""),
            ])
        })
        .collect();

    f.render_widget(
        List::new(items).block(Block::default().borders(Borders::ALL).title(" Latest News ")),
        area,
    );
}

fn render_holdings(f: &mut Frame, app: &App, pal: &Palette, area: Rect) {
    let Some(valuation) = &app.valuation else {
        let placeholder = Paragraph::new("Loading holdings...")
            .style(Style::default().fg(pal.dim))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title(" Holdings "));
        f.render_widget(placeholder, area);
        return;
    };

    if valuation.lots.is_empty() {
        let placeholder = Paragraph::new("No lots yet. Press a to add one.")
            .style(Style::default().fg(pal.dim))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title(" Holdings "));
        f.render_widget(placeholder, area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(area);

    let rows: Vec<Row> = valuation
        .lots
        .iter()
        .map(|lot| {
            let price = match lot.last_price {
                Some(p) => format!("${:.2}", p),
                None => "—".to_string(),
            };
            Row::new(vec![
                Span::styled(
                    lot.record.ticker.clone(),
                    Style::default().fg(pal.accent).add_modifier(Modifier::BOLD),
                ),
                Span::styled(format!("{:.2}", lot.record.shares), Style::default().fg(pal.text)),
                Span::styled(
                    format!("${:.2}", lot.record.buy_price),
                    Style::default().fg(pal.text),
                ),
                Span::styled(price, Style::default().fg(pal.text)),
                Span::styled(format!("${:.2}", lot.value), Style::default().fg(pal.text)),
                Span::styled(
                    format!("{:+.2} ({:+.2}%)", lot.gain, lot.gain_pct),
                    Style::default().fg(change_color(lot.gain)),
                ),
                Span::styled(
                    format!("{:.1}%", lot.allocation_pct),
                    Style::default().fg(pal.dim),
                ),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(9),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Length(20),
            Constraint::Min(6),
        ],
    )
    .header(header_row(
        &["Ticker", "Shares", "Cost", "Last", "Value", "Gain", "Alloc"],
        pal,
    ))
    .block(Block::default().borders(Borders::ALL).title(" Your Lots "));
    f.render_widget(table, chunks[0]);

    let totals = Paragraph::new(Line::from(vec![
        Span::styled("Total: ", Style::default().fg(pal.dim)),
        Span::styled(
            format!("${:.2}", valuation.total_value),
            Style::default().fg(pal.text).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(
            format!(
                "{:+.2} ({:+.2}%) on ${:.2} cost",
                valuation.total_gain, valuation.total_gain_pct, valuation.total_cost
            ),
            Style::default().fg(change_color(valuation.total_gain)),
        ),
    ]))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(totals, chunks[1]);
}

fn header_row(titles: &[&'static str], pal: &Palette) -> Row<'static> {
    Row::new(
        titles
            .iter()
            .map(|t| Span::styled(*t, Style::default().fg(pal.dim).add_modifier(Modifier::BOLD)))
            .collect::<Vec<_>>(),
    )
}

fn price_cell(quote: &QuoteSnapshot, pal: &Palette) -> Span<'static> {
    if quote.current <= 0.0 {
        Span::styled("no data", Style::default().fg(pal.dim))
    } else {
        Span::styled(
            format!("${:.2}", quote.current),
            Style::default().fg(pal.text).add_modifier(Modifier::BOLD),
        )
    }
}

fn change_cell(quote: &QuoteSnapshot, _pal: &Palette) -> Span<'static> {
    if quote.current <= 0.0 {
        Span::raw("")
    } else {
        Span::styled(
            format!("{:+.2} ({:+.2}%)", quote.change, quote.change_pct),
            Style::default().fg(change_color(quote.change)),
        )
    }
}
