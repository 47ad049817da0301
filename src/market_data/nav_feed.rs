//! Parsed snapshot of the bulk mutual fund NAV feed.
//!
//! The feed is AMFI's `NAVAll.txt`: `;`-separated rows
//!
//! ```text
//! Scheme Code;ISIN Div Payout/ ISIN Growth;ISIN Div Reinvestment;Scheme Name;Net Asset Value;Date
//! 122639;INF879O01027;-;Parag Parikh Flexi Cap Fund - Direct Plan - Growth;83.1234;15-Oct-2026
//! ```
//!
//! interleaved with blank lines and section headings (fund house, scheme
//! category) that contain no `;`. Rows that look like data but do not parse
//! are skipped and counted.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use super::matcher::{best_candidates, TokenSet};

const FIELD_COUNT: usize = 6;
const DATE_FORMAT: &str = "%d-%b-%Y";

#[derive(Debug, Clone)]
pub struct NavRecord {
    pub scheme_code: String,
    /// Upper-cased ISINs from the growth/payout and reinvestment columns.
    pub isins: Vec<String>,
    pub scheme_name: String,
    pub nav: Decimal,
    pub nav_date: NaiveDate,
    tokens: TokenSet,
}

impl NavRecord {
    /// Identifier recorded when this row is matched: its first ISIN, or the
    /// scheme code for rows without one.
    pub fn primary_identifier(&self) -> &str {
        self.isins
            .first()
            .map(String::as_str)
            .unwrap_or(&self.scheme_code)
    }

    pub fn has_identifier(&self, identifier: &str) -> bool {
        self.scheme_code.eq_ignore_ascii_case(identifier)
            || self.isins.iter().any(|i| i.eq_ignore_ascii_case(identifier))
    }

    pub fn tokens(&self) -> &TokenSet {
        &self.tokens
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.nav_date.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split(';').map(str::trim).collect();
        if fields.len() != FIELD_COUNT {
            return None;
        }

        let scheme_code = fields[0];
        let scheme_name = fields[3];
        if scheme_code.is_empty() || scheme_name.is_empty() {
            return None;
        }

        let nav = Decimal::from_str(fields[4]).ok()?;
        let nav_date = NaiveDate::parse_from_str(fields[5], DATE_FORMAT).ok()?;
        let isins = [fields[1], fields[2]]
            .into_iter()
            .filter(|isin| looks_like_isin(isin))
            .map(str::to_uppercase)
            .collect();

        Some(Self {
            scheme_code: scheme_code.to_string(),
            isins,
            scheme_name: scheme_name.to_string(),
            nav,
            nav_date,
            tokens: TokenSet::from_name(scheme_name),
        })
    }
}

fn looks_like_isin(value: &str) -> bool {
    value.len() == 12 && value.chars().all(|c| c.is_ascii_alphanumeric())
}

#[derive(Debug, Clone)]
pub struct NavSnapshot {
    records: Vec<NavRecord>,
    by_isin: HashMap<String, usize>,
    malformed: usize,
    fetched_at: DateTime<Utc>,
}

impl NavSnapshot {
    pub fn parse(text: &str, fetched_at: DateTime<Utc>) -> Self {
        let mut records = Vec::new();
        let mut malformed = 0;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || !line.contains(';') || line.starts_with("Scheme Code") {
                continue;
            }
            match NavRecord::parse(line) {
                Some(record) => records.push(record),
                None => malformed += 1,
            }
        }

        let mut by_isin = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            for isin in &record.isins {
                by_isin.entry(isin.clone()).or_insert(idx);
            }
        }

        Self {
            records,
            by_isin,
            malformed,
            fetched_at,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn malformed_rows(&self) -> usize {
        self.malformed
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn records(&self) -> &[NavRecord] {
        &self.records
    }

    /// Case-insensitive exact lookup on either ISIN column.
    pub fn find_by_isin(&self, isin: &str) -> Option<&NavRecord> {
        self.by_isin
            .get(&isin.trim().to_uppercase())
            .map(|idx| &self.records[*idx])
    }

    /// Row carrying a previously recorded identifier, which is an ISIN or,
    /// for rows without one, the scheme code.
    pub fn find_by_identifier(&self, identifier: &str) -> Option<&NavRecord> {
        let identifier = identifier.trim();
        self.find_by_isin(identifier).or_else(|| {
            self.records
                .iter()
                .find(|record| record.has_identifier(identifier))
        })
    }

    /// Best name matches for a free-text scheme name, deduplicated by
    /// identifier so a row repeated in the feed is not mistaken for ambiguity.
    pub fn search_by_name(&self, name: &str) -> Vec<&NavRecord> {
        let query = TokenSet::from_name(name);
        let mut matches = best_candidates(&query, &self.records, NavRecord::tokens);
        let mut seen = std::collections::HashSet::new();
        matches.retain(|record| seen.insert(record.primary_identifier().to_string()));
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const FEED: &str = "\
Scheme Code;ISIN Div Payout/ ISIN Growth;ISIN Div Reinvestment;Scheme Name;Net Asset Value;Date

Open Ended Schemes(Equity Scheme - Flexi Cap Fund)

PPFAS Mutual Fund

122639;INF879O01027;-;Parag Parikh Flexi Cap Fund - Direct Plan - Growth;83.1234;15-Oct-2026
122640;INF879O01019;-;Parag Parikh Flexi Cap Fund - Regular Plan - Growth;76.5000;15-Oct-2026
999999;INF000000001;-;Broken Fund - Growth;N.A.;15-Oct-2026
888888;-;-;Closed Scheme;12.0;not-a-date
777777;only;three
";

    fn snapshot() -> NavSnapshot {
        NavSnapshot::parse(FEED, Utc::now())
    }

    #[test]
    fn parses_rows_and_counts_malformed() {
        let snapshot = snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.malformed_rows(), 3);
    }

    #[test]
    fn isin_lookup_is_case_insensitive() {
        let snapshot = snapshot();
        let record = snapshot.find_by_isin("inf879o01027").expect("row");
        assert_eq!(record.nav, dec!(83.1234));
        assert_eq!(record.nav_date, NaiveDate::from_ymd_opt(2026, 10, 15).unwrap());
        assert!(snapshot.find_by_isin("INF000000001").is_none());
    }

    #[test]
    fn rows_without_isin_fall_back_to_scheme_code() {
        let snapshot = NavSnapshot::parse("100033;-;;Aditya Birla Sun Life Gold Fund;22.5;01-Oct-2026", Utc::now());
        let record = &snapshot.records()[0];
        assert!(record.isins.is_empty());
        assert_eq!(record.primary_identifier(), "100033");
        assert!(snapshot.find_by_identifier("100033").is_some());
        assert!(snapshot.find_by_identifier("100034").is_none());
    }

    #[test]
    fn direct_and_regular_rows_are_ambiguous_by_name() {
        let snapshot = snapshot();
        assert_eq!(snapshot.search_by_name("Parag Parikh Flexi Cap").len(), 2);
    }

    #[test]
    fn duplicated_rows_collapse() {
        let text = "\
1;INF111111111;-;Kotak Liquid Fund - Growth;10;01-Oct-2026
1;INF111111111;-;Kotak Liquid Fund - Growth;10;01-Oct-2026";
        let snapshot = NavSnapshot::parse(text, Utc::now());
        assert_eq!(snapshot.search_by_name("Kotak Liquid").len(), 1);
    }
}
