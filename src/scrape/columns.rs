// src/scrape/columns.rs

use std::borrow::Cow;

/// Meaning of each fixed position in the registrations table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Fuel,
    MonthlyRegistrationsCurrent,
    MonthlyRegistrationsPrevious,
    YoyPctChange,
    MarketShareCurrent,
    MarketSharePrevious,
}

/// Position → meaning. Index in this table is the cell position in a row.
pub const FIXED_COLUMNS: [Column; 6] = [
    Column::Fuel,
    Column::MonthlyRegistrationsCurrent,
    Column::MonthlyRegistrationsPrevious,
    Column::YoyPctChange,
    Column::MarketShareCurrent,
    Column::MarketSharePrevious,
];

pub const FUEL: &str = "fuel";

impl Column {
    pub fn field_name(&self, month: &str, current_year: u16, previous_year: u16) -> String {
        match self {
            Column::Fuel => FUEL.to_string(),
            Column::MonthlyRegistrationsCurrent => {
                format!("monthly_registrations_{}_{}", month, current_year)
            }
            Column::MonthlyRegistrationsPrevious => {
                format!("monthly_registrations_{}_{}", month, previous_year)
            }
            Column::YoyPctChange => "yoy_pct_change".to_string(),
            Column::MarketShareCurrent => format!("market_share_{}", current_year),
            Column::MarketSharePrevious => format!("market_share_{}", previous_year),
        }
    }
}

/// Field names for one parse, resolved against the month label of that page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    month: String,
    names: Vec<String>,
}

impl ColumnMapping {
    pub fn new(month: &str, current_year: u16, previous_year: u16) -> Self {
        let names = FIXED_COLUMNS
            .iter()
            .map(|c| c.field_name(month, current_year, previous_year))
            .collect();
        Self {
            month: month.to_string(),
            names,
        }
    }

    pub fn month(&self) -> &str {
        &self.month
    }

    /// Name for `position`; positions past the fixed table become `column_{position}`.
    pub fn name(&self, position: usize) -> Cow<'_, str> {
        match self.names.get(position) {
            Some(n) => Cow::Borrowed(n.as_str()),
            None => Cow::Owned(format!("column_{}", position)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_is_embedded_in_registration_columns() {
        let m = ColumnMapping::new("March", 2025, 2024);
        assert_eq!(m.name(0), "fuel");
        assert_eq!(m.name(1), "monthly_registrations_March_2025");
        assert_eq!(m.name(2), "monthly_registrations_March_2024");
        assert_eq!(m.name(3), "yoy_pct_change");
        assert_eq!(m.name(4), "market_share_2025");
        assert_eq!(m.name(5), "market_share_2024");
    }

    #[test]
    fn positions_past_the_table_fall_back() {
        let m = ColumnMapping::new("March", 2025, 2024);
        assert_eq!(m.name(6), "column_6");
        assert_eq!(m.name(11), "column_11");
    }
}
