//! Formula menu resolution.
//!
//! A formula order names a prepaid plan (Découverte, Standard, Confort, Duo)
//! and optionally an option letter. The plan's stored text is split into
//! base and option sections and expanded into scaled dish quantities.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::details::Details;
use crate::menu_text::{DishLine, MenuSections, SelectedOption};

/// Settings keys holding formula texts.
pub const FORMULA_SETTING_KEYS: &[&str] = &[
    FormulaKey::Decouverte.setting_key(),
    FormulaKey::Standard.setting_key(),
    FormulaKey::Confort.setting_key(),
    "menu_duo",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaKey {
    Decouverte,
    Standard,
    Confort,
}

impl FormulaKey {
    pub const fn setting_key(self) -> &'static str {
        match self {
            Self::Decouverte => "menu_decouverte",
            Self::Standard => "menu_standard",
            Self::Confort => "menu_confort",
        }
    }

    /// Case-sensitive substring match, first hit wins. Duo plans and
    /// unrecognised names use the Standard text.
    pub fn from_formula_name(name: &str) -> Self {
        if name.contains("Découverte") {
            Self::Decouverte
        } else if name.contains("Standard") {
            Self::Standard
        } else if name.contains("Confort") {
            Self::Confort
        } else {
            Self::Standard
        }
    }
}

/// Dish quantities are doubled for Duo plans, whatever text they resolve to.
pub fn duo_multiplier(name: &str) -> u32 {
    if name.contains("Duo") {
        2
    } else {
        1
    }
}

/// Snapshot of the French formula texts, keyed by setting key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormulaDefinitions {
    texts: HashMap<String, String>,
}

impl FormulaDefinitions {
    /// Build from settings rows. A value is a language map (`{"fr": ...}`),
    /// possibly serialized into a string; a string that is not JSON is taken
    /// as the French text itself. Rows without French text are skipped.
    pub fn from_rows<I, K>(rows: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut texts = HashMap::new();
        for (key, value) in rows {
            let key = key.into();
            match french_text(&value) {
                Some(text) => {
                    texts.insert(key, text);
                }
                None => debug!(setting_key = %key, "formula setting has no French text"),
            }
        }
        Self { texts }
    }

    pub fn text(&self, setting_key: &str) -> Option<&str> {
        self.texts.get(setting_key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Text used for `key`. Confort falls back to Standard when its own text
    /// is absent or blank; other keys have no fallback.
    pub fn text_for(&self, key: FormulaKey) -> Option<&str> {
        let own = self.text(key.setting_key());
        match key {
            FormulaKey::Confort if own.map_or(true, |t| t.trim().is_empty()) => {
                debug!("menu_confort missing, using menu_standard");
                self.text(FormulaKey::Standard.setting_key())
            }
            _ => own,
        }
    }
}

fn french_text(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => map.get("fr").and_then(Value::as_str).map(str::to_string),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map.get("fr").and_then(Value::as_str).map(str::to_string),
            _ => Some(raw.clone()),
        },
        _ => None,
    }
}

/// What a formula order asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaChoice {
    pub name: String,
    pub option: SelectedOption,
}

impl FormulaChoice {
    /// Read `formulaName` / `formulaOption`. Missing or non-string fields
    /// mean an empty name and no option; an unusable payload reads the same.
    pub fn from_details(details: &Details) -> Self {
        let name = details
            .get("formulaName")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let option = details
            .get("formulaOption")
            .and_then(Value::as_str)
            .map(SelectedOption::from_label)
            .unwrap_or_default();
        Self { name, option }
    }
}

/// Expand a formula order into dish lines, quantities already multiplied.
pub fn resolve(details: &Details, definitions: &FormulaDefinitions) -> Vec<DishLine> {
    let choice = FormulaChoice::from_details(details);
    let key = FormulaKey::from_formula_name(&choice.name);

    let Some(text) = definitions.text_for(key) else {
        debug!(setting_key = key.setting_key(), "formula text not configured");
        return Vec::new();
    };

    let multiplier = duo_multiplier(&choice.name);
    MenuSections::split(text)
        .dishes_for(choice.option)
        .into_iter()
        .map(|line| DishLine {
            quantity: line.quantity.saturating_mul(multiplier),
            name: line.name,
        })
        .collect()
}
