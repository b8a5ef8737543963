use crate::app::{App, ChartState, DetailsState, DialogKind};
use crate::chart::{ChartView, CHART_TITLE, START_MARKER_LABEL, X_AXIS_LABEL, Y_AXIS_LABEL};
use crate::data::Timeframe;
use crate::performance::MetricsText;
use crate::portfolio::Holding;
use chrono::{Local, NaiveTime, TimeZone};
use eframe::egui;
use egui_plot::{Line, LineStyle, Plot, PlotPoints, PlotUi, VLine};
use std::collections::HashMap;

// ──────────────────────────────────────────────────────────────────────────────
// Color Palette
// ──────────────────────────────────────────────────────────────────────────────

const ACCENT_BLUE: egui::Color32 = egui::Color32::from_rgb(59, 130, 246);
const ACCENT_GREEN: egui::Color32 = egui::Color32::from_rgb(34, 197, 94);
const ACCENT_RED: egui::Color32 = egui::Color32::from_rgb(239, 68, 68);
const ACCENT_YELLOW: egui::Color32 = egui::Color32::from_rgb(250, 204, 21);
const ACCENT_ORANGE: egui::Color32 = egui::Color32::from_rgb(251, 146, 60);
const ACCENT_CYAN: egui::Color32 = egui::Color32::from_rgb(34, 211, 238);
const ACCENT_PURPLE: egui::Color32 = egui::Color32::from_rgb(168, 85, 247);

const BG_DARK: egui::Color32 = egui::Color32::from_rgb(15, 15, 20);
const BG_CARD: egui::Color32 = egui::Color32::from_rgb(24, 24, 32);
const BG_ELEVATED: egui::Color32 = egui::Color32::from_rgb(32, 32, 44);
const TEXT_PRIMARY: egui::Color32 = egui::Color32::from_rgb(226, 232, 240);
const TEXT_SECONDARY: egui::Color32 = egui::Color32::from_rgb(148, 163, 184);
const BORDER_SUBTLE: egui::Color32 = egui::Color32::from_rgb(51, 51, 68);

const LINE_COLORS: [egui::Color32; 6] = [
    ACCENT_CYAN,
    ACCENT_YELLOW,
    ACCENT_GREEN,
    ACCENT_PURPLE,
    ACCENT_ORANGE,
    ACCENT_BLUE,
];

// ──────────────────────────────────────────────────────────────────────────────
// GUI State
// ──────────────────────────────────────────────────────────────────────────────

enum AddStep {
    Symbol,
    Percent(String),
}

/// Two-step "Add New Stock" prompt.
struct AddPrompt {
    step: AddStep,
    text: String,
    focused: bool,
}

impl AddPrompt {
    fn new() -> Self {
        Self {
            step: AddStep::Symbol,
            text: String::new(),
            focused: false,
        }
    }
}

enum PromptOutcome {
    Pending,
    Submit,
    Cancel,
}

enum DetailsAction {
    Remove(String),
    SetPercent(String, String),
    AddStock,
}

pub struct GuiApp {
    app: App,
    start_input: String,
    end_input: String,
    amount_input: String,
    percent_inputs: HashMap<String, String>,
    add_prompt: Option<AddPrompt>,
}

impl GuiApp {
    pub fn new(cc: &eframe::CreationContext<'_>, app: App) -> Self {
        Self::apply_theme(&cc.egui_ctx);
        Self::with_app(app)
    }

    fn with_app(app: App) -> Self {
        Self {
            start_input: app.session.start_date.clone(),
            end_input: app.session.end_date.clone(),
            amount_input: app.session.starting_amount.to_string(),
            percent_inputs: HashMap::new(),
            add_prompt: None,
            app,
        }
    }

    fn apply_theme(ctx: &egui::Context) {
        let mut style = (*ctx.style()).clone();

        style.visuals.window_rounding = egui::Rounding::same(8.0);
        style.visuals.widgets.noninteractive.rounding = egui::Rounding::same(6.0);
        style.visuals.widgets.inactive.rounding = egui::Rounding::same(6.0);
        style.visuals.widgets.active.rounding = egui::Rounding::same(6.0);
        style.visuals.widgets.hovered.rounding = egui::Rounding::same(6.0);

        style.visuals.dark_mode = true;
        style.visuals.panel_fill = BG_DARK;
        style.visuals.window_fill = BG_CARD;
        style.visuals.faint_bg_color = BG_ELEVATED;

        style.visuals.widgets.noninteractive.bg_fill = BG_CARD;
        style.visuals.widgets.noninteractive.fg_stroke = egui::Stroke::new(1.0, TEXT_SECONDARY);
        style.visuals.widgets.inactive.bg_fill = BG_ELEVATED;
        style.visuals.widgets.inactive.fg_stroke = egui::Stroke::new(1.0, TEXT_PRIMARY);
        style.visuals.widgets.hovered.bg_fill = egui::Color32::from_rgb(45, 45, 60);
        style.visuals.widgets.hovered.fg_stroke = egui::Stroke::new(1.0, egui::Color32::WHITE);
        style.visuals.widgets.active.bg_fill = ACCENT_BLUE;
        style.visuals.widgets.active.fg_stroke = egui::Stroke::new(1.0, egui::Color32::WHITE);

        style.visuals.selection.bg_fill = ACCENT_BLUE.linear_multiply(0.4);
        style.visuals.selection.stroke = egui::Stroke::new(1.0, ACCENT_BLUE);

        style.spacing.item_spacing = egui::vec2(8.0, 6.0);

        ctx.set_style(style);
    }

    fn modal_open(&self) -> bool {
        self.app.current_dialog().is_some() || self.add_prompt.is_some()
    }
}

impl eframe::App for GuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ui(ctx);
    }
}

impl GuiApp {
    fn ui(&mut self, ctx: &egui::Context) {
        self.app.tick();
        if self.app.is_busy() {
            ctx.request_repaint();
        }

        let enabled = !self.modal_open();
        // Enter that submitted a field this frame must not also close the
        // dialog that submission raised.
        let dialog_was_showing = self.app.current_dialog().is_some();

        // ── Top Bar ──
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.add_enabled_ui(enabled, |ui| {
                egui::menu::bar(ui, |ui| {
                    ui.menu_button("Portfolio", |ui| {
                        if ui.button("Portfolio Details").clicked() {
                            self.app.open_details();
                            ui.close_menu();
                        }
                    });
                });
                ui.add_space(4.0);
                self.render_controls(ui);
                ui.add_space(4.0);
            });
        });

        // ── Main Content ──
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_enabled_ui(enabled, |ui| self.render_chart_area(ui));
        });

        if self.app.details_open {
            self.render_details_window(ctx, enabled);
        }
        self.render_add_prompt(ctx);
        self.render_dialog(ctx, dialog_was_showing);
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Controls & Chart
// ──────────────────────────────────────────────────────────────────────────────

impl GuiApp {
    fn render_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal_wrapped(|ui| {
            ui.label(egui::RichText::new("Select Timeframe:").color(TEXT_SECONDARY));
            let mut selected = self.app.session.timeframe;
            let mut picked = false;
            egui::ComboBox::from_id_salt("timeframe")
                .selected_text(selected.as_str())
                .width(70.0)
                .show_ui(ui, |ui| {
                    for tf in Timeframe::ALL {
                        picked |= ui.selectable_value(&mut selected, tf, tf.as_str()).clicked();
                    }
                });
            if picked {
                self.app.set_timeframe(selected);
            }

            ui.add_space(8.0);
            ui.label(egui::RichText::new("Start Date (YYYY-MM-DD):").color(TEXT_SECONDARY));
            let start = ui.add(egui::TextEdit::singleline(&mut self.start_input).desired_width(90.0));
            if start.lost_focus() {
                self.app.commit_start_date(&self.start_input);
            }

            ui.add_space(8.0);
            ui.label(egui::RichText::new("End Date (YYYY-MM-DD) or 'now':").color(TEXT_SECONDARY));
            let end = ui.add(egui::TextEdit::singleline(&mut self.end_input).desired_width(90.0));
            if end.lost_focus() {
                self.app.commit_end_date(&self.end_input, Local::now().date_naive());
                self.end_input = self.app.session.end_date.clone();
            }

            ui.add_space(8.0);
            ui.label(egui::RichText::new("Starting Amount:").color(TEXT_SECONDARY));
            let amount = ui.add(egui::TextEdit::singleline(&mut self.amount_input).desired_width(80.0));
            if amount.lost_focus() && !self.app.commit_starting_amount(&self.amount_input) {
                self.amount_input = self.app.session.starting_amount.to_string();
            }
        });
    }

    fn render_chart_area(&mut self, ui: &mut egui::Ui) {
        match &self.app.chart {
            ChartState::Empty => {
                render_centered_status(
                    ui,
                    "Add stocks from Portfolio > Portfolio Details, then pick a timeframe.",
                    false,
                );
            }
            ChartState::Loading => {
                render_centered_status(ui, "Fetching Market Data...", true);
            }
            ChartState::Ready(view) => render_chart(ui, view),
        }
    }
}

fn render_chart(ui: &mut egui::Ui, view: &ChartView) {
    egui::Frame::none()
        .fill(BG_CARD)
        .rounding(egui::Rounding::same(8.0))
        .stroke(egui::Stroke::new(1.0, BORDER_SUBTLE))
        .inner_margin(egui::Margin::same(8.0))
        .show(ui, |ui| {
            ui.vertical_centered(|ui| section_header(ui, CHART_TITLE));

            let plot = Plot::new("portfolio_chart")
                .legend(egui_plot::Legend::default().position(egui_plot::Corner::LeftTop))
                .x_axis_label(X_AXIS_LABEL)
                .y_axis_label(Y_AXIS_LABEL)
                .x_axis_formatter(|x, _range| format_timestamp(x.value, "%Y-%m-%d"))
                .label_formatter(|name, value| {
                    let date = format_timestamp(value.x, "%Y-%m-%d");
                    if name.is_empty() {
                        format!("Date: {}\nValue: {:.2}", date, value.y)
                    } else {
                        format!("{}\nDate: {}\nValue: {:.2}", name, date, value.y)
                    }
                })
                .height(ui.available_height().max(200.0))
                .allow_drag(true)
                .allow_zoom(true);

            plot.show(ui, |plot_ui| draw_chart_data(plot_ui, view));
        });
}

fn draw_chart_data(plot_ui: &mut PlotUi, view: &ChartView) {
    for (i, line) in view.lines.iter().enumerate() {
        let points: PlotPoints = line
            .points
            .iter()
            .map(|(date, y)| [date.timestamp() as f64, *y])
            .collect();
        plot_ui.line(
            Line::new(points)
                .name(&line.label)
                .color(LINE_COLORS[i % LINE_COLORS.len()])
                .width(1.8),
        );
    }

    let marker_x = view.start_marker.and_time(NaiveTime::MIN).and_utc().timestamp() as f64;
    plot_ui.vline(
        VLine::new(marker_x)
            .name(START_MARKER_LABEL)
            .color(ACCENT_RED)
            .style(LineStyle::Dashed { length: 8.0 }),
    );
}

fn format_timestamp(x: f64, fmt: &str) -> String {
    chrono::Utc
        .timestamp_opt(x as i64, 0)
        .single()
        .map(|dt| dt.format(fmt).to_string())
        .unwrap_or_default()
}

// ──────────────────────────────────────────────────────────────────────────────
// Portfolio Details Window
// ──────────────────────────────────────────────────────────────────────────────

impl GuiApp {
    fn render_details_window(&mut self, ctx: &egui::Context, enabled: bool) {
        let holdings: Vec<Holding> = self.app.session.portfolio.holdings().to_vec();
        self.percent_inputs.retain(|symbol, _| holdings.iter().any(|h| &h.symbol == symbol));

        let rows: HashMap<String, MetricsText> = match &self.app.details {
            DetailsState::Ready(rows) => rows.iter().map(|r| (r.symbol.clone(), r.text())).collect(),
            _ => HashMap::new(),
        };
        let loading = self.app.details == DetailsState::Loading;

        let mut open = true;
        let mut actions = Vec::new();

        egui::Window::new("Portfolio Details")
            .open(&mut open)
            .default_width(960.0)
            .resizable(true)
            .show(ctx, |ui| {
                ui.add_enabled_ui(enabled, |ui| {
                    if holdings.is_empty() {
                        ui.label(egui::RichText::new("No stocks in the portfolio yet.").color(TEXT_SECONDARY));
                    } else {
                        egui::Grid::new("details_grid")
                            .striped(true)
                            .spacing(egui::vec2(10.0, 6.0))
                            .show(ui, |ui| {
                                for header in [
                                    "Stock (%)",
                                    "Start Date Price",
                                    "Current Price",
                                    "P/L%",
                                    "Shares Owned",
                                    "Monetary Return",
                                    "",
                                ] {
                                    ui.label(egui::RichText::new(header).size(11.0).color(TEXT_SECONDARY));
                                }
                                ui.end_row();

                                for holding in &holdings {
                                    self.render_details_row(ui, holding, rows.get(&holding.symbol), &mut actions);
                                    ui.end_row();
                                }
                            });
                    }

                    ui.add_space(8.0);
                    ui.horizontal(|ui| {
                        let add = ui.add(
                            egui::Button::new(egui::RichText::new("Add New Stock").strong().color(egui::Color32::WHITE))
                                .fill(ACCENT_BLUE)
                                .rounding(egui::Rounding::same(6.0)),
                        );
                        if add.clicked() {
                            actions.push(DetailsAction::AddStock);
                        }
                        if loading {
                            ui.spinner();
                            ui.label(egui::RichText::new("Fetching...").size(11.0).color(TEXT_SECONDARY));
                        }
                    });
                });
            });

        for action in actions {
            match action {
                DetailsAction::Remove(symbol) => self.app.remove_holding(&symbol),
                DetailsAction::SetPercent(symbol, text) => {
                    self.app.set_percent(&symbol, &text);
                    // Re-seeded from the stored value next frame.
                    self.percent_inputs.remove(&symbol);
                }
                DetailsAction::AddStock => self.add_prompt = Some(AddPrompt::new()),
            }
        }

        if !open {
            self.app.close_details();
        }
    }

    fn render_details_row(
        &mut self,
        ui: &mut egui::Ui,
        holding: &Holding,
        text: Option<&MetricsText>,
        actions: &mut Vec<DetailsAction>,
    ) {
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new(format!("{} (%):", holding.symbol)).strong().color(TEXT_PRIMARY));
            let input = self
                .percent_inputs
                .entry(holding.symbol.clone())
                .or_insert_with(|| holding.percent.to_string());
            let response = ui.add(egui::TextEdit::singleline(input).desired_width(50.0));
            if response.lost_focus() && percent_edit_pending(input, holding.percent) {
                actions.push(DetailsAction::SetPercent(holding.symbol.clone(), input.clone()));
            }
        });

        let na = MetricsText::not_available();
        let text = text.unwrap_or(&na);
        readonly_field(ui, &text.start_price, TEXT_PRIMARY);
        readonly_field(ui, &text.current_price, TEXT_PRIMARY);
        readonly_field(ui, &text.percent_gain_loss, signed_color(&text.percent_gain_loss));
        readonly_field(ui, &text.shares_owned, TEXT_PRIMARY);
        readonly_field(ui, &text.monetary_return, signed_color(&text.monetary_return));

        if ui.button("Remove").clicked() {
            actions.push(DetailsAction::Remove(holding.symbol.clone()));
        }
    }

    // ── Add Stock prompt ──

    fn render_add_prompt(&mut self, ctx: &egui::Context) {
        let Some(mut prompt) = self.add_prompt.take() else {
            return;
        };
        // Messages raised by the prompt take precedence.
        let enabled = self.app.current_dialog().is_none();

        let (title, question) = match &prompt.step {
            AddStep::Symbol => ("Add Stock".to_string(), "Enter the stock symbol:".to_string()),
            AddStep::Percent(symbol) => (
                "Enter Percentage".to_string(),
                format!("Enter the percentage for {}:", symbol),
            ),
        };

        let mut outcome = PromptOutcome::Pending;
        egui::Window::new(title)
            .id(egui::Id::new("add_stock_prompt"))
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.add_enabled_ui(enabled, |ui| {
                    ui.label(egui::RichText::new(question).color(TEXT_PRIMARY));
                    let response = ui.add(egui::TextEdit::singleline(&mut prompt.text).desired_width(220.0));
                    if !prompt.focused {
                        response.request_focus();
                        prompt.focused = true;
                    }
                    if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                        outcome = PromptOutcome::Submit;
                    }
                    ui.add_space(6.0);
                    ui.horizontal(|ui| {
                        if ui.button("OK").clicked() {
                            outcome = PromptOutcome::Submit;
                        }
                        if ui.button("Cancel").clicked() {
                            outcome = PromptOutcome::Cancel;
                        }
                    });
                });
            });

        self.add_prompt = match outcome {
            PromptOutcome::Pending => Some(prompt),
            PromptOutcome::Cancel => None,
            PromptOutcome::Submit => match prompt.step {
                AddStep::Symbol => self.app.check_new_symbol(&prompt.text).map(|symbol| AddPrompt {
                    step: AddStep::Percent(symbol),
                    text: String::new(),
                    focused: false,
                }),
                AddStep::Percent(symbol) => {
                    self.app.add_holding(&symbol, &prompt.text);
                    None
                }
            },
        };
    }

    // ── Message dialogs ──

    fn render_dialog(&mut self, ctx: &egui::Context, accept_enter: bool) {
        let Some(dialog) = self.app.current_dialog().cloned() else {
            return;
        };
        let color = match dialog.kind {
            DialogKind::Info => ACCENT_BLUE,
            DialogKind::Warning => ACCENT_YELLOW,
            DialogKind::Error => ACCENT_RED,
        };

        let mut dismissed = false;
        egui::Window::new(egui::RichText::new(&dialog.title).color(color).strong())
            .id(egui::Id::new("message_dialog"))
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.set_min_width(260.0);
                ui.label(egui::RichText::new(&dialog.message).color(TEXT_PRIMARY));
                ui.add_space(8.0);
                ui.vertical_centered(|ui| {
                    let enter = accept_enter && ui.input(|i| i.key_pressed(egui::Key::Enter));
                    if ui.button("OK").clicked() || enter {
                        dismissed = true;
                    }
                });
            });

        if dismissed {
            self.app.dismiss_dialog();
        }
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────────────────────────────────────

fn section_header(ui: &mut egui::Ui, text: &str) {
    ui.label(egui::RichText::new(text).size(13.0).strong().color(TEXT_PRIMARY));
    ui.add_space(4.0);
}

fn render_centered_status(ui: &mut egui::Ui, message: &str, spinner: bool) {
    let available = ui.available_size();
    ui.vertical_centered(|ui| {
        ui.add_space(available.y * 0.35);
        ui.label(egui::RichText::new(message).size(15.0).color(TEXT_SECONDARY));
        if spinner {
            ui.add_space(12.0);
            ui.spinner();
        }
    });
}

fn readonly_field(ui: &mut egui::Ui, value: &str, color: egui::Color32) {
    egui::Frame::none()
        .fill(BG_ELEVATED)
        .rounding(egui::Rounding::same(4.0))
        .stroke(egui::Stroke::new(1.0, BORDER_SUBTLE))
        .inner_margin(egui::Margin::symmetric(6.0, 2.0))
        .show(ui, |ui| {
            ui.set_min_width(80.0);
            ui.label(egui::RichText::new(value).monospace().color(color));
        });
}

/// True when the edit buffer holds something other than the stored value.
/// Unparseable text counts as an edit so the rejection gets reported.
fn percent_edit_pending(text: &str, current: f64) -> bool {
    text.trim().parse::<f64>().map_or(true, |v| v != current)
}

fn signed_color(value: &str) -> egui::Color32 {
    if value.starts_with('+') {
        ACCENT_GREEN
    } else if value.contains('-') {
        ACCENT_RED
    } else {
        TEXT_PRIMARY
    }
}
