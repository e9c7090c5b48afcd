//! Market list: raw ingredient weights derived from dish counts.
//!
//! Each portion is assumed to carry 150 g of one protein (if its name says
//! which) and 100 g of a starch side. The starch side is noodles when the
//! name mentions a noodle, rice otherwise, so every portion counts towards
//! exactly one starch bucket.

use serde::Serialize;
use std::collections::BTreeMap;

/// Kilograms of protein per portion.
pub const PROTEIN_KG_PER_PORTION: f64 = 0.15;
/// Kilograms of starch per portion.
pub const STARCH_KG_PER_PORTION: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Protein {
    Poulet,
    Porc,
    Boeuf,
    Poisson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Starch {
    Riz,
    Nouilles,
}

/// Checked in this order; the first bucket with a matching keyword wins.
const PROTEIN_KEYWORDS: &[(Protein, &[&str])] = &[
    (Protein::Poulet, &["poulet", "canard", "dinde", "oie", "volaille"]),
    (Protein::Porc, &["porc", "cochon", "lard", "poitrine", "travers"]),
    (Protein::Boeuf, &["boeuf", "bœuf", "veau"]),
    (
        Protein::Poisson,
        &[
            "poisson", "crevette", "gambas", "thon", "saumon", "calamar", "encornet", "seiche",
            "crabe", "langouste", "jacques", "daurade", "cabillaud", "lotte", "mer",
        ],
    ),
];

const NOODLE_KEYWORDS: &[&str] = &["nouilles", "ramen", "udon", "soba", "somen", "vermicelle"];

pub fn classify_protein(name: &str) -> Option<Protein> {
    let lower = name.to_lowercase();
    PROTEIN_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(protein, _)| *protein)
}

pub fn classify_starch(name: &str) -> Starch {
    let lower = name.to_lowercase();
    if NOODLE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Starch::Nouilles
    } else {
        Starch::Riz
    }
}

/// Kilograms to buy per bucket. Values are unrounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MarketList {
    pub poulet: f64,
    pub porc: f64,
    pub boeuf: f64,
    pub poisson: f64,
    pub riz: f64,
    pub nouilles: f64,
}

impl MarketList {
    /// Account for `quantity` portions of the dish called `name`.
    pub fn add(&mut self, name: &str, quantity: i64) {
        let portions = quantity as f64;
        if let Some(protein) = classify_protein(name) {
            *self.protein_mut(protein) += portions * PROTEIN_KG_PER_PORTION;
        }
        match classify_starch(name) {
            Starch::Riz => self.riz += portions * STARCH_KG_PER_PORTION,
            Starch::Nouilles => self.nouilles += portions * STARCH_KG_PER_PORTION,
        }
    }

    fn protein_mut(&mut self, protein: Protein) -> &mut f64 {
        match protein {
            Protein::Poulet => &mut self.poulet,
            Protein::Porc => &mut self.porc,
            Protein::Boeuf => &mut self.boeuf,
            Protein::Poisson => &mut self.poisson,
        }
    }

    /// Printable label and weight for each bucket, in display order.
    pub fn entries(&self) -> [(&'static str, f64); 6] {
        [
            ("Poulet / volaille", self.poulet),
            ("Porc", self.porc),
            ("Bœuf / veau", self.boeuf),
            ("Poisson / fruits de mer", self.poisson),
            ("Riz", self.riz),
            ("Nouilles", self.nouilles),
        ]
    }

    pub fn total_kg(&self) -> f64 {
        self.entries().iter().map(|(_, kg)| kg).sum()
    }
}

/// Market list over both aggregate maps. Dish and special keys are treated
/// the same way.
pub fn compute_market_list(
    dish_totals: &BTreeMap<String, i64>,
    special_totals: &BTreeMap<String, i64>,
) -> MarketList {
    dish_totals
        .iter()
        .chain(special_totals)
        .fold(MarketList::default(), |mut list, (name, qty)| {
            list.add(name, *qty);
            list
        })
}
