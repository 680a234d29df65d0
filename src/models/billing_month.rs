// src/models/billing_month.rs

use std::{fmt, str::FromStr};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::{
    encode::IsNull,
    error::BoxDynError,
    postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef},
    Decode, Encode, Postgres, Type,
};
use thiserror::Error;

/// Competência de uma fatura, no formato `YYYY-MM`.
///
/// A aritmética é feita direto sobre (ano, mês), sem passar por datas completas,
/// então `2024-01` menos um mês é `2023-12` sem surpresas de fim de mês.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BillingMonth {
    // A ordem dos campos importa: o derive de Ord compara ano e depois mês.
    year: i32,
    month: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("competência inválida '{0}': esperado YYYY-MM")]
pub struct MonthParseError(pub String);

impl BillingMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, MonthParseError> {
        if !(1..=12).contains(&month) || !(0..=9999).contains(&year) {
            return Err(MonthParseError(format!("{:04}-{:02}", year, month)));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Desloca a competência `delta` meses (negativo = para trás).
    ///
    /// Falha se o resultado sair de `0000-01..=9999-12`, que é o que o token `YYYY-MM` representa.
    pub fn shift(self, delta: i32) -> Result<Self, MonthParseError> {
        let out_of_range = || MonthParseError(format!("{} {:+} mês(es)", self, delta));

        let index = (self.year * 12 + (self.month as i32 - 1))
            .checked_add(delta)
            .ok_or_else(out_of_range)?;
        Self::new(index.div_euclid(12), index.rem_euclid(12) as u32 + 1).map_err(|_| out_of_range())
    }

    pub fn next(self) -> Result<Self, MonthParseError> {
        self.shift(1)
    }

    pub fn previous(self) -> Result<Self, MonthParseError> {
        self.shift(-1)
    }

    /// Dia `day` dentro desta competência, limitado ao último dia do mês
    /// (dia 31 em fevereiro vira 28/29).
    pub fn day_clamped(self, day: u32) -> NaiveDate {
        let last_day = self.last_day();
        let day = day.clamp(1, last_day);
        // Ano/mês já validados e dia limitado ao mês: a data sempre existe.
        NaiveDate::from_ymd_opt(self.year, self.month, day)
            .unwrap_or_else(|| self.first_day())
    }

    fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    fn last_day(self) -> u32 {
        // Dezembro de 9999 não tem sucessor representável, mas dezembro sempre tem 31 dias.
        let (year, month) = if self.month == 12 { (self.year + 1, 1) } else { (self.year, self.month + 1) };
        NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|d| d.pred_opt())
            .map(|d| d.day())
            .unwrap_or(28)
    }
}

impl From<NaiveDate> for BillingMonth {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl FromStr for BillingMonth {
    type Err = MonthParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || MonthParseError(raw.to_string());

        let (year, month) = raw.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        if !year.bytes().chain(month.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl fmt::Display for BillingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl TryFrom<String> for BillingMonth {
    type Error = MonthParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BillingMonth> for String {
    fn from(month: BillingMonth) -> Self {
        month.to_string()
    }
}

// --- Mapeamento para a coluna VARCHAR(7) do Postgres ---

impl Type<Postgres> for BillingMonth {
    fn type_info() -> PgTypeInfo {
        <str as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <str as Type<Postgres>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Postgres> for BillingMonth {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        <String as Encode<'q, Postgres>>::encode(self.to_string(), buf)
    }
}

impl<'r> Decode<'r, Postgres> for BillingMonth {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let raw = <&str as Decode<'r, Postgres>>::decode(value)?;
        Ok(raw.parse::<BillingMonth>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(raw: &str) -> BillingMonth {
        raw.parse().unwrap()
    }

    #[test]
    fn parses_and_prints_the_token() {
        let month = m("2024-03");
        assert_eq!(month.year(), 2024);
        assert_eq!(month.month(), 3);
        assert_eq!(month.to_string(), "2024-03");
    }

    #[test]
    fn rejects_malformed_tokens() {
        for raw in ["2024-13", "2024-00", "24-01", "2024-1", "2024/01", "2024-01-01", "abcd-ef", "", "+024-01"] {
            assert!(raw.parse::<BillingMonth>().is_err(), "{raw} deveria ser inválido");
        }
    }

    #[test]
    fn shift_rolls_over_year_boundaries() {
        assert_eq!(m("2024-01").previous().unwrap(), m("2023-12"));
        assert_eq!(m("2023-12").next().unwrap(), m("2024-01"));
        assert_eq!(m("2024-05").shift(-17).unwrap(), m("2022-12"));
        assert_eq!(m("2024-05").shift(20).unwrap(), m("2026-01"));
        assert_eq!(m("2024-05").shift(0).unwrap(), m("2024-05"));
    }

    #[test]
    fn shift_stays_inside_the_four_digit_range() {
        assert!(m("9999-12").next().is_err());
        assert!(m("0000-01").previous().is_err());
        assert!(m("2024-05").shift(i32::MAX).is_err());
        assert!(m("2024-05").shift(i32::MIN).is_err());
        assert_eq!(m("9999-11").next().unwrap(), m("9999-12"));
        assert_eq!(m("0000-02").previous().unwrap(), m("0000-01"));

        let err = m("9999-12").shift(1).unwrap_err();
        assert!(err.to_string().contains("9999-12"));
    }

    #[test]
    fn orders_chronologically() {
        assert!(m("2023-12") < m("2024-01"));
        assert!(m("2024-02") > m("2024-01"));
        let mut months = vec![m("2024-02"), m("2023-11"), m("2024-01")];
        months.sort();
        assert_eq!(months, vec![m("2023-11"), m("2024-01"), m("2024-02")]);
    }

    #[test]
    fn day_clamped_respects_short_months() {
        assert_eq!(m("2024-02").day_clamped(31), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(m("2023-02").day_clamped(30), NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());
        assert_eq!(m("2024-04").day_clamped(15), NaiveDate::from_ymd_opt(2024, 4, 15).unwrap());
        assert_eq!(m("9999-12").day_clamped(31), NaiveDate::from_ymd_opt(9999, 12, 31).unwrap());
    }

    #[test]
    fn serde_uses_the_string_token() {
        let json = serde_json::to_string(&m("2024-07")).unwrap();
        assert_eq!(json, "\"2024-07\"");
        let back: BillingMonth = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m("2024-07"));
        assert!(serde_json::from_str::<BillingMonth>("\"2024-7\"").is_err());
    }
}
