//! Printable production sheet.
//!
//! Renders a [`ConsolidationReport`] as fixed-width plain text for the
//! kitchen wall: a header, one checkbox line per dish and per special, then
//! the market list in kilograms.

use crate::consolidation::ConsolidationReport;

pub const DEFAULT_WIDTH: usize = 48;
const MIN_WIDTH: usize = 24;

const TITLE: &str = "FICHE DE PRODUCTION";
const EMPTY_SECTION: &str = "(aucun)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetLayout {
    pub width: usize,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
        }
    }
}

impl SheetLayout {
    /// Widths below 24 columns are raised to 24.
    pub fn with_width(width: usize) -> Self {
        Self {
            width: width.max(MIN_WIDTH),
        }
    }
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(8);
    let mut out = Vec::new();
    let mut line = String::new();
    for token in text.split_whitespace() {
        if line.is_empty() {
            line.push_str(token);
        } else if line.chars().count() + 1 + token.chars().count() > width {
            out.push(std::mem::take(&mut line));
            line.push_str(token);
        } else {
            line.push(' ');
            line.push_str(token);
        }
        // A single token longer than the line is cut hard.
        while line.chars().count() > width {
            let head: String = line.chars().take(width).collect();
            let tail: String = line.chars().skip(width).collect();
            out.push(head);
            line = tail;
        }
    }
    if !line.is_empty() {
        out.push(line);
    }
    if out.is_empty() {
        out.push(String::new());
    }
    out
}

fn centered(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    format!("{}{}", " ".repeat((width - len) / 2), text)
}

struct Sheet {
    width: usize,
    out: String,
}

impl Sheet {
    fn new(width: usize) -> Self {
        Self {
            width,
            out: String::new(),
        }
    }

    fn line(&mut self, text: &str) {
        self.out.push_str(text.trim_end());
        self.out.push('\n');
    }

    fn rule(&mut self, ch: char) {
        let rule: String = std::iter::repeat(ch).take(self.width).collect();
        self.line(&rule);
    }

    fn section(&mut self, title: &str) {
        self.line("");
        self.line(title);
        self.rule('-');
    }

    fn field(&mut self, label: &str, value: &str) {
        let prefix = format!("{label} : ");
        let indent = prefix.chars().count();
        for (i, chunk) in wrap(value, self.width.saturating_sub(indent))
            .iter()
            .enumerate()
        {
            if i == 0 {
                self.line(&format!("{prefix}{chunk}"));
            } else {
                self.line(&format!("{}{chunk}", " ".repeat(indent)));
            }
        }
    }

    /// `[ ] <qty>x <name>`, continuation lines aligned under the name.
    fn checkbox(&mut self, quantity: i64, name: &str) {
        let prefix = format!("[ ] {quantity}x ");
        let indent = prefix.chars().count();
        let name = if name.trim().is_empty() { "?" } else { name };
        for (i, chunk) in wrap(name, self.width.saturating_sub(indent))
            .iter()
            .enumerate()
        {
            if i == 0 {
                self.line(&format!("{prefix}{chunk}"));
            } else {
                self.line(&format!("{}{chunk}", " ".repeat(indent)));
            }
        }
    }

    /// Label on the left, value flush right. A label too long to share the
    /// line is wrapped and the value goes on its own line.
    fn pair(&mut self, label: &str, value: &str) {
        let label_len = label.chars().count();
        let value_len = value.chars().count();
        if label_len + 1 + value_len <= self.width {
            let gap = self.width - label_len - value_len;
            self.line(&format!("{label}{}{value}", " ".repeat(gap)));
            return;
        }
        for chunk in wrap(label, self.width) {
            self.line(&chunk);
        }
        self.line(&format!(
            "{}{value}",
            " ".repeat(self.width.saturating_sub(value_len))
        ));
    }
}

fn kg(value: f64) -> String {
    format!("{value:.2} kg")
}

/// Render `report` as a production sheet.
pub fn render(report: &ConsolidationReport, layout: SheetLayout) -> String {
    let width = layout.width.max(MIN_WIDTH);
    let mut sheet = Sheet::new(width);
    let stats = report.consolidation.stats;

    sheet.rule('=');
    sheet.line(&centered(TITLE, width));
    sheet.rule('=');
    sheet.field(
        "Unité",
        report.filter.business_unit.as_deref().unwrap_or("toutes"),
    );
    sheet.field("Dates", &report.filter.date.label());
    sheet.field(
        "Édité le",
        &report.generated_at.format("%d/%m/%Y %H:%M UTC").to_string(),
    );
    sheet.field("Réf.", &report.short_id());
    sheet.field(
        "Commandes",
        &format!(
            "{} menus, {} spéciales",
            stats.formula_orders, stats.special_orders
        ),
    );
    if stats.degraded_details > 0 {
        sheet.field(
            "Attention",
            &format!(
                "{} commande(s) illisible(s), à vérifier",
                stats.degraded_details
            ),
        );
    }

    sheet.section("PRODUCTION");
    if report.consolidation.dish_totals.is_empty() {
        sheet.line(EMPTY_SECTION);
    }
    for (name, quantity) in &report.consolidation.dish_totals {
        sheet.checkbox(*quantity, name);
    }

    sheet.section("COMMANDES SPÉCIALES");
    if report.consolidation.special_totals.is_empty() {
        sheet.line(EMPTY_SECTION);
    }
    for (key, quantity) in &report.consolidation.special_totals {
        sheet.checkbox(*quantity, key);
    }

    sheet.section("LISTE DE MARCHÉ");
    for (label, weight) in report.market_list.entries() {
        sheet.pair(label, &kg(weight));
    }
    sheet.rule('-');
    sheet.pair("Total", &kg(report.market_list.total_kg()));
    sheet.rule('=');

    sheet.out
}
