//! Menu text grammar.
//!
//! Formula definitions are free text maintained by the kitchen. Two
//! conventions carry meaning inside that text:
//!
//! - a dish line is `<N>x <name>`, e.g. `2x Riz cantonais`;
//! - `Option A` / `Option B` markers split the text into a base section
//!   followed by up to two option bodies.
//!
//! A dish name runs until `*`, `+`, `<` or a newline. Anything else stays in
//! the name, including a later `3x` on the same line, so `1x Riz 2x Porc` is a
//! single dish called `Riz 2x Porc`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

/// One `(quantity, dish)` pair extracted from menu text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DishLine {
    pub quantity: u32,
    pub name: String,
}

fn dish_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)([0-9]+)\s*x\s*([^*+\n<]+)").expect("valid dish line regex")
    })
}

fn option_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)Option\s*[AB][:.-]?").expect("valid option marker regex"))
}

/// Extract every dish line from `text`, in order of appearance.
///
/// Matches with a zero quantity, an overflowing quantity, or a name that is
/// blank after trimming are dropped.
pub fn parse_dish_lines(text: &str) -> Vec<DishLine> {
    dish_line_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let raw_quantity = caps.get(1).map_or("", |m| m.as_str());
            let name = caps.get(2).map_or("", |m| m.as_str()).trim();

            let quantity = match raw_quantity.parse::<u32>() {
                Ok(q) if q > 0 => q,
                _ => {
                    debug!(
                        quantity = %raw_quantity,
                        name = %name,
                        "dropping dish line with unusable quantity"
                    );
                    return None;
                }
            };
            if name.is_empty() {
                debug!(quantity, "dropping dish line with blank name");
                return None;
            }

            Some(DishLine {
                quantity,
                name: name.to_string(),
            })
        })
        .collect()
}

/// Which option body of a formula the customer picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectedOption {
    #[default]
    None,
    A,
    B,
}

impl SelectedOption {
    /// Interpret a free-text option label. `OPTION A` wins over `OPTION B`
    /// when both appear.
    pub fn from_label(label: &str) -> Self {
        let upper = label.to_uppercase();
        if upper.contains("OPTION A") {
            Self::A
        } else if upper.contains("OPTION B") {
            Self::B
        } else {
            Self::None
        }
    }
}

/// A formula text cut at its option markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MenuSections<'a> {
    pub base: &'a str,
    pub option_a: &'a str,
    pub option_b: &'a str,
}

impl<'a> MenuSections<'a> {
    /// Text before the first marker is the base. With a single marker the
    /// body after it is option A and option B stays empty. Bodies past the
    /// second marker are ignored.
    pub fn split(text: &'a str) -> Self {
        let mut parts = option_marker_re().split(text);
        Self {
            base: parts.next().unwrap_or(""),
            option_a: parts.next().unwrap_or(""),
            option_b: parts.next().unwrap_or(""),
        }
    }

    pub fn option_text(&self, option: SelectedOption) -> &'a str {
        match option {
            SelectedOption::A => self.option_a,
            SelectedOption::B => self.option_b,
            SelectedOption::None => "",
        }
    }

    /// Base dishes plus the dishes of the chosen option.
    pub fn dishes_for(&self, option: SelectedOption) -> Vec<DishLine> {
        let relevant = format!("{} {}", self.base, self.option_text(option));
        parse_dish_lines(&relevant)
    }
}
