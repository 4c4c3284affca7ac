//! Where operators.
//!
//! Operator strings are uppercased, whitespace-normalized and mapped through
//! a synonym table into a closed [`Operator`] enum. Each operator belongs to
//! exactly one [`OperatorKind`], which selects the compiler handler.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tiller_common::TillerError;

/// Handler family of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    /// `= <> > >= < <=`
    Comparison,
    /// `LIKE`, `NOT LIKE`
    Like,
    /// `IS NULL`, `IS NOT NULL`
    Null,
    /// `IN`, `NOT IN`
    In,
    /// `BETWEEN`, `NOT BETWEEN`
    Between,
    /// `EXISTS`, `NOT EXISTS`
    Exists,
    /// Column-to-column comparison.
    Column,
    /// Raw expression after the field.
    Exp,
    /// Comparisons whose values are coerced through the column's time type.
    Time,
}

/// A where operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operator {
    /// `=`
    Eq,
    /// `<>`
    Neq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `LIKE`
    Like,
    /// `NOT LIKE`
    NotLike,
    /// `IS NULL`
    Null,
    /// `IS NOT NULL`
    NotNull,
    /// `IN`
    In,
    /// `NOT IN`
    NotIn,
    /// `BETWEEN`
    Between,
    /// `NOT BETWEEN`
    NotBetween,
    /// `EXISTS`
    Exists,
    /// `NOT EXISTS`
    NotExists,
    /// Compares the field with another column.
    Column,
    /// Appends a raw expression to the field.
    Exp,
    /// `> TIME`
    GtTime,
    /// `>= TIME`
    GteTime,
    /// `< TIME`
    LtTime,
    /// `<= TIME`
    LteTime,
    /// `BETWEEN TIME`
    BetweenTime,
    /// `NOT BETWEEN TIME`
    NotBetweenTime,
}

impl Operator {
    /// Parses an operator string, accepting the usual synonyms.
    ///
    /// Returns `None` for operators no handler understands.
    #[must_use]
    pub fn parse(op: &str) -> Option<Self> {
        let normalized = op.split_whitespace().collect::<Vec<_>>().join(" ");
        let op = match normalized.to_ascii_uppercase().as_str() {
            "=" | "EQ" => Operator::Eq,
            "<>" | "!=" | "NEQ" => Operator::Neq,
            ">" | "GT" => Operator::Gt,
            ">=" | "EGT" | "GTE" => Operator::Gte,
            "<" | "LT" => Operator::Lt,
            "<=" | "ELT" | "LTE" => Operator::Lte,
            "LIKE" => Operator::Like,
            "NOT LIKE" | "NOTLIKE" => Operator::NotLike,
            "NULL" | "IS NULL" => Operator::Null,
            "NOT NULL" | "NOTNULL" | "IS NOT NULL" => Operator::NotNull,
            "IN" => Operator::In,
            "NOT IN" | "NOTIN" => Operator::NotIn,
            "BETWEEN" => Operator::Between,
            "NOT BETWEEN" | "NOTBETWEEN" => Operator::NotBetween,
            "EXISTS" => Operator::Exists,
            "NOT EXISTS" | "NOTEXISTS" => Operator::NotExists,
            "COLUMN" => Operator::Column,
            "EXP" => Operator::Exp,
            "> TIME" | "GT TIME" => Operator::GtTime,
            ">= TIME" | "EGT TIME" => Operator::GteTime,
            "< TIME" | "LT TIME" => Operator::LtTime,
            "<= TIME" | "ELT TIME" => Operator::LteTime,
            "BETWEEN TIME" => Operator::BetweenTime,
            "NOT BETWEEN TIME" | "NOTBETWEEN TIME" => Operator::NotBetweenTime,
            _ => return None,
        };
        Some(op)
    }

    /// Returns the handler family.
    #[must_use]
    pub const fn kind(&self) -> OperatorKind {
        match self {
            Operator::Eq
            | Operator::Neq
            | Operator::Gt
            | Operator::Gte
            | Operator::Lt
            | Operator::Lte => OperatorKind::Comparison,
            Operator::Like | Operator::NotLike => OperatorKind::Like,
            Operator::Null | Operator::NotNull => OperatorKind::Null,
            Operator::In | Operator::NotIn => OperatorKind::In,
            Operator::Between | Operator::NotBetween => OperatorKind::Between,
            Operator::Exists | Operator::NotExists => OperatorKind::Exists,
            Operator::Column => OperatorKind::Column,
            Operator::Exp => OperatorKind::Exp,
            Operator::GtTime
            | Operator::GteTime
            | Operator::LtTime
            | Operator::LteTime
            | Operator::BetweenTime
            | Operator::NotBetweenTime => OperatorKind::Time,
        }
    }

    /// Returns the SQL text emitted between field and value.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Neq => "<>",
            Operator::Gt | Operator::GtTime => ">",
            Operator::Gte | Operator::GteTime => ">=",
            Operator::Lt | Operator::LtTime => "<",
            Operator::Lte | Operator::LteTime => "<=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::Null => "IS NULL",
            Operator::NotNull => "IS NOT NULL",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Between | Operator::BetweenTime => "BETWEEN",
            Operator::NotBetween | Operator::NotBetweenTime => "NOT BETWEEN",
            Operator::Exists => "EXISTS",
            Operator::NotExists => "NOT EXISTS",
            Operator::Column => "COLUMN",
            Operator::Exp => "EXP",
        }
    }

    /// Returns true for the time-suffixed range operators.
    #[must_use]
    pub const fn is_time_range(&self) -> bool {
        matches!(self, Operator::BetweenTime | Operator::NotBetweenTime)
    }

    /// Maps a plain comparison or range operator to its time-suffixed form.
    #[must_use]
    pub const fn to_time(self) -> Option<Self> {
        match self {
            Operator::Gt | Operator::GtTime => Some(Operator::GtTime),
            Operator::Gte | Operator::GteTime => Some(Operator::GteTime),
            Operator::Lt | Operator::LtTime => Some(Operator::LtTime),
            Operator::Lte | Operator::LteTime => Some(Operator::LteTime),
            Operator::Between | Operator::BetweenTime => Some(Operator::BetweenTime),
            Operator::NotBetween | Operator::NotBetweenTime => Some(Operator::NotBetweenTime),
            _ => None,
        }
    }
}

impl FromStr for Operator {
    type Err = TillerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::parse(s).ok_or_else(|| TillerError::UnknownOperator {
            operator: s.to_string(),
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonyms() {
        assert_eq!(Operator::parse("eq"), Some(Operator::Eq));
        assert_eq!(Operator::parse("!="), Some(Operator::Neq));
        assert_eq!(Operator::parse("NEQ"), Some(Operator::Neq));
        assert_eq!(Operator::parse("egt"), Some(Operator::Gte));
        assert_eq!(Operator::parse("ELT"), Some(Operator::Lte));
        assert_eq!(Operator::parse("notlike"), Some(Operator::NotLike));
        assert_eq!(Operator::parse("not   in"), Some(Operator::NotIn));
        assert_eq!(Operator::parse("> time"), Some(Operator::GtTime));
        assert_eq!(Operator::parse("between time"), Some(Operator::BetweenTime));
        assert_eq!(Operator::parse("~~"), None);
    }

    #[test]
    fn test_kinds_are_disjoint() {
        assert_eq!(Operator::Eq.kind(), OperatorKind::Comparison);
        assert_eq!(Operator::NotLike.kind(), OperatorKind::Like);
        assert_eq!(Operator::NotNull.kind(), OperatorKind::Null);
        assert_eq!(Operator::NotIn.kind(), OperatorKind::In);
        assert_eq!(Operator::NotBetween.kind(), OperatorKind::Between);
        assert_eq!(Operator::NotExists.kind(), OperatorKind::Exists);
        assert_eq!(Operator::GteTime.kind(), OperatorKind::Time);
        assert_eq!(Operator::GteTime.as_sql(), ">=");
    }

    #[test]
    fn test_from_str_error() {
        let err = "regexp".parse::<Operator>().unwrap_err();
        assert_eq!(err.to_string(), "unknown operator: regexp");
    }

    #[test]
    fn test_to_time() {
        assert_eq!(Operator::Gt.to_time(), Some(Operator::GtTime));
        assert_eq!(Operator::Between.to_time(), Some(Operator::BetweenTime));
        assert_eq!(Operator::Like.to_time(), None);
    }
}
