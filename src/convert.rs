/// Unit conversion and value formatting.
///
/// Values arrive as decimal text in the server's unit. They are parsed into
/// `rust_decimal::Decimal`, converted through a table of pure functions keyed
/// by (source unit, target unit) and formatted, optionally rounded to a fixed
/// number of fractional digits. No binary floating point is involved, so a
/// reading of `300.00` K always formats as the same Celsius string.
///
/// Unit pairs missing from the table pass the value through unchanged: the
/// units are either already compatible or only differ in their label.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::WxConfig;
use crate::model::{CellValue, NO_DATA};

/// A conversion between two units. `None` when the result falls outside the
/// range `Decimal` can represent.
pub type ConversionFn = fn(Decimal) -> Option<Decimal>;

// ---------------------------------------------------------------------------
// Conversion functions
// ---------------------------------------------------------------------------

fn kelvin_to_celsius(x: Decimal) -> Option<Decimal> {
    x.checked_sub(Decimal::new(27315, 2))
}

fn pascal_to_hectopascal(x: Decimal) -> Option<Decimal> {
    x.checked_div(Decimal::ONE_HUNDRED)
}

fn identity(x: Decimal) -> Option<Decimal> {
    Some(x)
}

// ---------------------------------------------------------------------------
// Conversion table
// ---------------------------------------------------------------------------

/// Conversion functions keyed by (source unit, target unit).
/// Source units are matched case-insensitively; target units exactly.
#[derive(Debug, Clone)]
pub struct ConversionTable {
    table: HashMap<(String, String), ConversionFn>,
}

impl Default for ConversionTable {
    /// The conversions the telemetry servers need: Kelvin and Pascal to the
    /// display units, plus relabels from the servers' English unit names.
    fn default() -> Self {
        let mut table = Self::empty();
        table.register("k", "C", kelvin_to_celsius);
        table.register("pa", "гПа", pascal_to_hectopascal);
        table.register("code table", "кодовая таблица", identity);
        table.register("degree true", "°", identity);
        table.register("kg m-2", "мм", identity);
        table.register("m", "м", identity);
        table.register("m/s", "м/с", identity);
        table.register("min", "мин", identity);
        table
    }
}

impl ConversionTable {
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn register(&mut self, source: &str, target: &str, f: ConversionFn) {
        self.table
            .insert((source.to_lowercase(), target.to_string()), f);
    }

    pub fn lookup(&self, source: &str, target: &str) -> Option<ConversionFn> {
        self.table
            .get(&(source.to_lowercase(), target.to_string()))
            .copied()
    }

    pub fn has_conversion(&self, source: &str, target: &str) -> bool {
        self.lookup(source, target).is_some()
    }

    /// Converts `value`; pairs without an entry are the identity.
    /// `None` if the conversion overflows.
    pub fn apply(&self, value: Decimal, source: &str, target: &str) -> Option<Decimal> {
        match self.lookup(source, target) {
            Some(f) => f(value),
            None => Some(value),
        }
    }

    /// Converts and formats `value`, rounding to `precision` fractional
    /// digits when given. A value the conversion cannot represent formats as
    /// the no-data marker.
    pub fn convert(&self, value: Decimal, source: &str, target: &str, precision: Option<u32>) -> String {
        match self.apply(value, source, target) {
            Some(converted) => format_decimal(converted, precision),
            None => NO_DATA.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing and formatting
// ---------------------------------------------------------------------------

/// Reads a raw measurement value. Plain and scientific notation are accepted,
/// surrounding whitespace is ignored; anything else is `NoData`.
pub fn parse_value(raw: &str) -> CellValue {
    let raw = raw.trim();
    if raw.is_empty() {
        return CellValue::NoData;
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map(CellValue::Number)
        .unwrap_or(CellValue::NoData)
}

/// Formats a decimal. With a precision the value is rounded half-to-even and
/// always shows exactly that many fractional digits (`0` → `"0.0"`).
pub fn format_decimal(value: Decimal, precision: Option<u32>) -> String {
    match precision {
        Some(dp) => {
            let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointNearestEven);
            if rounded.scale() < dp {
                rounded.rescale(dp);
            }
            rounded.to_string()
        }
        None => value.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Unit converter
// ---------------------------------------------------------------------------

/// Conversion table combined with the configured display preferences.
#[derive(Debug, Clone)]
pub struct UnitConverter {
    table: ConversionTable,
    /// Raw unit (lowercase) → display unit.
    preferences: HashMap<String, String>,
    /// Display unit → fractional digits.
    precision: HashMap<String, u32>,
}

impl UnitConverter {
    pub fn new(
        table: ConversionTable,
        preferences: HashMap<String, String>,
        precision: HashMap<String, u32>,
    ) -> Self {
        let preferences = preferences
            .into_iter()
            .map(|(raw, display)| (raw.to_lowercase(), display))
            .collect();
        Self {
            table,
            preferences,
            precision,
        }
    }

    pub fn from_config(config: &WxConfig) -> Self {
        Self::new(
            ConversionTable::default(),
            config.units.clone(),
            config.precision.clone(),
        )
    }

    /// Display unit for a raw unit; the raw unit itself when no preference
    /// is configured.
    pub fn target_unit(&self, source_unit: &str) -> String {
        self.preferences
            .get(&source_unit.to_lowercase())
            .cloned()
            .unwrap_or_else(|| source_unit.to_string())
    }

    pub fn precision_for(&self, target_unit: &str) -> Option<u32> {
        self.precision.get(target_unit).copied()
    }

    pub fn table(&self) -> &ConversionTable {
        &self.table
    }

    /// Formats one raw value reported in `source_unit` for display.
    /// Unparseable values become the no-data marker and skip conversion.
    pub fn format_value(&self, raw: &str, source_unit: &str) -> String {
        match parse_value(raw) {
            CellValue::Number(value) => {
                let target = self.target_unit(source_unit);
                self.table
                    .convert(value, source_unit, &target, self.precision_for(&target))
            }
            CellValue::NoData => NO_DATA.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
