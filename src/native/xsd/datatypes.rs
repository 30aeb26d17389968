//! Simple type validation: built-in datatypes, derivation and facets

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::Violation;
use super::model::{ComplexType, Content, Facets, Schema, SimpleType, SimpleTypeRef, TypeDef, WhiteSpace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    AnySimpleType,
    String,
    NormalizedString,
    Token,
    Language,
    Name,
    NcName,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    QName,
    Notation,
    AnyUri,
    Boolean,
    Decimal,
    Integer,
    NonNegativeInteger,
    PositiveInteger,
    NonPositiveInteger,
    NegativeInteger,
    Long,
    Int,
    Short,
    Byte,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    Double,
    Float,
    Date,
    DateTime,
    Time,
    GYear,
    GYearMonth,
    GMonth,
    GDay,
    GMonthDay,
    Duration,
    HexBinary,
    Base64Binary,
}

const TIMEZONE: &str = r"(Z|[+-]\d{2}:\d{2})?";
const DATE: &str = r"-?\d{4,}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])";
const TIME: &str = r"([01]\d|2[0-3]):[0-5]\d:[0-5]\d(\.\d+)?";
const NCNAME: &str = r"[\p{L}_][\p{L}\p{N}._\-\x{B7}]*";

static LEXICAL: LazyLock<HashMap<Builtin, Regex>> = LazyLock::new(|| {
    let patterns = [
        (Builtin::Language, r"[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*".to_string()),
        (Builtin::Name, r"[\p{L}_:][\p{L}\p{N}._:\-\x{B7}]*".to_string()),
        (Builtin::NcName, NCNAME.to_string()),
        (Builtin::Id, NCNAME.to_string()),
        (Builtin::IdRef, NCNAME.to_string()),
        (Builtin::Entity, NCNAME.to_string()),
        (Builtin::NmToken, r"[\p{L}\p{N}._:\-\x{B7}]+".to_string()),
        (Builtin::QName, format!("({NCNAME}:)?{NCNAME}")),
        (Builtin::Notation, format!("({NCNAME}:)?{NCNAME}")),
        (Builtin::Boolean, "true|false|1|0".to_string()),
        (Builtin::Decimal, r"[+-]?(\d+(\.\d*)?|\.\d+)".to_string()),
        (Builtin::Integer, r"[+-]?\d+".to_string()),
        (Builtin::Double, r"[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?|INF|-INF|NaN".to_string()),
        (Builtin::Date, format!("{DATE}{TIMEZONE}")),
        (Builtin::DateTime, format!("{DATE}T{TIME}{TIMEZONE}")),
        (Builtin::Time, format!("{TIME}{TIMEZONE}")),
        (Builtin::GYear, format!(r"-?\d{{4,}}{TIMEZONE}")),
        (Builtin::GYearMonth, format!(r"-?\d{{4,}}-(0[1-9]|1[0-2]){TIMEZONE}")),
        (Builtin::GMonth, format!("--(0[1-9]|1[0-2]){TIMEZONE}")),
        (Builtin::GDay, format!(r"---(0[1-9]|[12]\d|3[01]){TIMEZONE}")),
        (Builtin::GMonthDay, format!(r"--(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01]){TIMEZONE}")),
        (Builtin::Duration, r"-?P(\d+Y)?(\d+M)?(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?".to_string()),
        (Builtin::HexBinary, "([0-9a-fA-F]{2})*".to_string()),
        (Builtin::Base64Binary, "[A-Za-z0-9+/= ]*".to_string()),
    ];
    patterns
        .into_iter()
        .filter_map(|(builtin, pattern)| {
            Regex::new(&format!("^(?:{pattern})$"))
                .ok()
                .map(|regex| (builtin, regex))
        })
        .collect()
});

impl Builtin {
    pub fn from_local(name: &str) -> Option<Builtin> {
        let builtin = match name {
            "anySimpleType" | "anyAtomicType" => Builtin::AnySimpleType,
            "string" => Builtin::String,
            "normalizedString" => Builtin::NormalizedString,
            "token" => Builtin::Token,
            "language" => Builtin::Language,
            "Name" => Builtin::Name,
            "NCName" => Builtin::NcName,
            "ID" => Builtin::Id,
            "IDREF" => Builtin::IdRef,
            "IDREFS" => Builtin::IdRefs,
            "ENTITY" => Builtin::Entity,
            "ENTITIES" => Builtin::Entities,
            "NMTOKEN" => Builtin::NmToken,
            "NMTOKENS" => Builtin::NmTokens,
            "QName" => Builtin::QName,
            "NOTATION" => Builtin::Notation,
            "anyURI" => Builtin::AnyUri,
            "boolean" => Builtin::Boolean,
            "decimal" => Builtin::Decimal,
            "integer" => Builtin::Integer,
            "nonNegativeInteger" => Builtin::NonNegativeInteger,
            "positiveInteger" => Builtin::PositiveInteger,
            "nonPositiveInteger" => Builtin::NonPositiveInteger,
            "negativeInteger" => Builtin::NegativeInteger,
            "long" => Builtin::Long,
            "int" => Builtin::Int,
            "short" => Builtin::Short,
            "byte" => Builtin::Byte,
            "unsignedLong" => Builtin::UnsignedLong,
            "unsignedInt" => Builtin::UnsignedInt,
            "unsignedShort" => Builtin::UnsignedShort,
            "unsignedByte" => Builtin::UnsignedByte,
            "double" => Builtin::Double,
            "float" => Builtin::Float,
            "date" => Builtin::Date,
            "dateTime" => Builtin::DateTime,
            "time" => Builtin::Time,
            "gYear" => Builtin::GYear,
            "gYearMonth" => Builtin::GYearMonth,
            "gMonth" => Builtin::GMonth,
            "gDay" => Builtin::GDay,
            "gMonthDay" => Builtin::GMonthDay,
            "duration" => Builtin::Duration,
            "hexBinary" => Builtin::HexBinary,
            "base64Binary" => Builtin::Base64Binary,
            _ => return None,
        };
        Some(builtin)
    }

    pub fn whitespace(self) -> WhiteSpace {
        match self {
            Builtin::String | Builtin::AnySimpleType => WhiteSpace::Preserve,
            Builtin::NormalizedString => WhiteSpace::Replace,
            _ => WhiteSpace::Collapse,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Builtin::Decimal
                | Builtin::Integer
                | Builtin::NonNegativeInteger
                | Builtin::PositiveInteger
                | Builtin::NonPositiveInteger
                | Builtin::NegativeInteger
                | Builtin::Long
                | Builtin::Int
                | Builtin::Short
                | Builtin::Byte
                | Builtin::UnsignedLong
                | Builtin::UnsignedInt
                | Builtin::UnsignedShort
                | Builtin::UnsignedByte
                | Builtin::Double
                | Builtin::Float
        )
    }

    fn is_list(self) -> bool {
        matches!(self, Builtin::IdRefs | Builtin::Entities | Builtin::NmTokens)
    }

    fn integer_bounds(self) -> Option<(Option<i128>, Option<i128>)> {
        let bounds = match self {
            Builtin::Integer => (None, None),
            Builtin::NonNegativeInteger => (Some(0), None),
            Builtin::PositiveInteger => (Some(1), None),
            Builtin::NonPositiveInteger => (None, Some(0)),
            Builtin::NegativeInteger => (None, Some(-1)),
            Builtin::Long => (Some(i64::MIN.into()), Some(i64::MAX.into())),
            Builtin::Int => (Some(i32::MIN.into()), Some(i32::MAX.into())),
            Builtin::Short => (Some(i16::MIN.into()), Some(i16::MAX.into())),
            Builtin::Byte => (Some(i8::MIN.into()), Some(i8::MAX.into())),
            Builtin::UnsignedLong => (Some(0), Some(u64::MAX.into())),
            Builtin::UnsignedInt => (Some(0), Some(u32::MAX.into())),
            Builtin::UnsignedShort => (Some(0), Some(u16::MAX.into())),
            Builtin::UnsignedByte => (Some(0), Some(u8::MAX.into())),
            _ => return None,
        };
        Some(bounds)
    }

    fn lexical_key(self) -> Builtin {
        match self {
            Builtin::Float => Builtin::Double,
            b if b.integer_bounds().is_some() => Builtin::Integer,
            b => b,
        }
    }

    fn is_valid(self, value: &str) -> bool {
        if self.is_list() {
            let item = match self {
                Builtin::IdRefs => Builtin::IdRef,
                Builtin::Entities => Builtin::Entity,
                _ => Builtin::NmToken,
            };
            return !value.is_empty() && value.split(' ').all(|token| item.is_valid(token));
        }

        if let Some(regex) = LEXICAL.get(&self.lexical_key()) {
            if !regex.is_match(value) {
                return false;
            }
        }

        if self == Builtin::Duration && (value.ends_with('P') || value.ends_with('T')) {
            return false;
        }

        match self.integer_bounds() {
            Some((min, max)) => match value.trim_start_matches('+').parse::<i128>() {
                Ok(number) => min.is_none_or(|min| number >= min) && max.is_none_or(|max| number <= max),
                Err(_) => min.is_none() && max.is_none(),
            },
            None => true,
        }
    }

    /// Check a raw value, returning it whitespace-normalized
    pub fn check(self, raw: &str, type_name: &str) -> Result<String, Violation> {
        let value = self.whitespace().apply(raw);
        if self.is_valid(&value) {
            Ok(value)
        } else {
            Err(Violation::Invalid(format!(
                "cvc-datatype-valid.1.2.1: '{value}' is not a valid value for '{type_name}'."
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variety {
    Atomic(Builtin),
    List,
    Union,
}

const DEPTH_LIMIT: usize = 64;
const ANONYMOUS: &str = "#AnonType";

/// Simple type checks against one schema
pub struct Datatypes<'s> {
    schema: &'s Schema,
}

impl<'s> Datatypes<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self { schema }
    }

    /// Validate `raw` against `type_ref` (`None` accepts anything) and
    /// return the normalized value
    pub fn check(&self, type_ref: Option<&SimpleTypeRef>, raw: &str) -> Result<String, Violation> {
        match type_ref {
            Some(type_ref) => self.check_ref(type_ref, raw, 0),
            None => Ok(raw.to_string()),
        }
    }

    /// Validate `raw` against an anonymous simple type
    pub fn check_inline(&self, simple: &SimpleType, raw: &str) -> Result<String, Violation> {
        self.check_type(simple, ANONYMOUS, raw, 0)
    }

    /// Whether `type_ref` resolves to a simple type
    pub fn resolves(&self, type_ref: &SimpleTypeRef) -> bool {
        self.variety(type_ref, 0).is_ok()
    }

    fn check_ref(&self, type_ref: &SimpleTypeRef, raw: &str, depth: usize) -> Result<String, Violation> {
        if depth > DEPTH_LIMIT {
            return Err(Violation::Grammar("simple type derivation is too deep".to_string()));
        }
        match type_ref {
            SimpleTypeRef::Named(name) if name.is_xsd() => Builtin::from_local(&name.local)
                .ok_or_else(|| Violation::Grammar(format!("'{}' is not a built-in simple type", name.local)))?
                .check(raw, &name.local),
            SimpleTypeRef::Named(name) => match self.schema.types.get(name) {
                Some(TypeDef::Simple(simple)) => self.check_type(simple, &name.local, raw, depth + 1),
                Some(TypeDef::Complex(ComplexType {
                    content: Content::Simple(inner),
                    ..
                })) => self.check_ref(inner, raw, depth + 1),
                _ => Err(Violation::Grammar(format!("'{name}' is not a simple type"))),
            },
            SimpleTypeRef::Inline(simple) => self.check_type(simple, ANONYMOUS, raw, depth + 1),
        }
    }

    fn check_type(&self, simple: &SimpleType, name: &str, raw: &str, depth: usize) -> Result<String, Violation> {
        match simple {
            SimpleType::Restriction { base, facets } => {
                let base_value = self.check_ref(base, raw, depth)?;
                let value = match facets.white_space {
                    Some(white_space) => white_space.apply(&base_value),
                    None => base_value,
                };
                let variety = self.variety(base, depth)?;
                check_facets(facets, name, &value, variety)?;
                Ok(value)
            }
            SimpleType::List { item } => {
                let value = WhiteSpace::Collapse.apply(raw);
                for token in value.split(' ').filter(|token| !token.is_empty()) {
                    self.check_ref(item, token, depth)?;
                }
                Ok(value)
            }
            SimpleType::Union { members } => {
                for member in members {
                    match self.check_ref(member, raw, depth) {
                        Ok(value) => return Ok(value),
                        Err(Violation::Invalid(_)) => continue,
                        Err(grammar) => return Err(grammar),
                    }
                }
                Err(Violation::Invalid(format!(
                    "cvc-datatype-valid.1.2.3: '{}' is not a valid value of union type '{name}'.",
                    WhiteSpace::Collapse.apply(raw)
                )))
            }
        }
    }

    fn variety(&self, type_ref: &SimpleTypeRef, depth: usize) -> Result<Variety, Violation> {
        if depth > DEPTH_LIMIT {
            return Err(Violation::Grammar("simple type derivation is too deep".to_string()));
        }
        let simple = match type_ref {
            SimpleTypeRef::Named(name) if name.is_xsd() => {
                let builtin = Builtin::from_local(&name.local)
                    .ok_or_else(|| Violation::Grammar(format!("'{}' is not a built-in simple type", name.local)))?;
                return Ok(if builtin.is_list() { Variety::List } else { Variety::Atomic(builtin) });
            }
            SimpleTypeRef::Named(name) => match self.schema.types.get(name) {
                Some(TypeDef::Simple(simple)) => simple,
                Some(TypeDef::Complex(ComplexType {
                    content: Content::Simple(inner),
                    ..
                })) => return self.variety(inner, depth + 1),
                _ => return Err(Violation::Grammar(format!("'{name}' is not a simple type"))),
            },
            SimpleTypeRef::Inline(simple) => simple,
        };
        match simple {
            SimpleType::Restriction { base, .. } => self.variety(base, depth + 1),
            SimpleType::List { .. } => Ok(Variety::List),
            SimpleType::Union { .. } => Ok(Variety::Union),
        }
    }
}

fn check_facets(facets: &Facets, name: &str, value: &str, variety: Variety) -> Result<(), Violation> {
    let numeric = matches!(variety, Variety::Atomic(builtin) if builtin.is_numeric());
    let invalid = |message: String| Err(Violation::Invalid(message));

    if !facets.enumeration.is_empty() {
        let found = facets.enumeration.iter().any(|candidate| {
            if numeric {
                number(candidate).is_some_and(|c| number(value) == Some(c))
            } else {
                candidate == value
            }
        });
        if !found {
            return invalid(format!(
                "cvc-enumeration-valid: Value '{value}' is not facet-valid with respect to enumeration '[{}]'. It must be a value from the enumeration.",
                facets.enumeration.join(", ")
            ));
        }
    }

    if !facets.patterns.is_empty() && !facets.patterns.iter().any(|p| p.regex.is_match(value)) {
        let source = facets
            .patterns
            .iter()
            .map(|p| p.source.as_str())
            .collect::<Vec<_>>()
            .join("|");
        return invalid(format!(
            "cvc-pattern-valid: Value '{value}' is not facet-valid with respect to pattern '{source}' for type '{name}'."
        ));
    }

    let length = match variety {
        Variety::List => value.split(' ').filter(|token| !token.is_empty()).count(),
        Variety::Atomic(Builtin::HexBinary) => value.len() / 2,
        _ => value.chars().count(),
    };
    if let Some(expected) = facets.length.filter(|expected| length != *expected) {
        return invalid(format!(
            "cvc-length-valid: Value '{value}' with length = '{length}' is not facet-valid with respect to length '{expected}' for type '{name}'."
        ));
    }
    if let Some(min) = facets.min_length.filter(|min| length < *min) {
        return invalid(format!(
            "cvc-minLength-valid: Value '{value}' with length = '{length}' is not facet-valid with respect to minLength '{min}' for type '{name}'."
        ));
    }
    if let Some(max) = facets.max_length.filter(|max| length > *max) {
        return invalid(format!(
            "cvc-maxLength-valid: Value '{value}' with length = '{length}' is not facet-valid with respect to maxLength '{max}' for type '{name}'."
        ));
    }

    let bounds = [
        ("minInclusive", &facets.min_inclusive, [false, true, true]),
        ("maxInclusive", &facets.max_inclusive, [true, true, false]),
        ("minExclusive", &facets.min_exclusive, [false, false, true]),
        ("maxExclusive", &facets.max_exclusive, [true, false, false]),
    ];
    for (facet, bound, allowed) in bounds {
        let Some(bound) = bound else {
            continue;
        };
        // allowed[0]: value < bound, allowed[1]: equal, allowed[2]: value > bound
        let ordering = if numeric {
            match (number(value), number(bound)) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            }
        } else {
            Some(value.cmp(bound.as_str()))
        };
        let ok = match ordering {
            Some(std::cmp::Ordering::Less) => allowed[0],
            Some(std::cmp::Ordering::Equal) => allowed[1],
            Some(std::cmp::Ordering::Greater) => allowed[2],
            None => false,
        };
        if !ok {
            return invalid(format!(
                "cvc-{facet}-valid: Value '{value}' is not facet-valid with respect to {facet} '{bound}' for type '{name}'."
            ));
        }
    }

    if numeric {
        let (total, fraction) = digits(value);
        if let Some(limit) = facets.total_digits.filter(|limit| total > *limit) {
            return invalid(format!(
                "cvc-totalDigits-valid: Value '{value}' has {total} total digits, but the number of total digits has been limited to {limit}."
            ));
        }
        if let Some(limit) = facets.fraction_digits.filter(|limit| fraction > *limit) {
            return invalid(format!(
                "cvc-fractionDigits-valid: Value '{value}' has {fraction} fraction digits, but the number of fraction digits has been limited to {limit}."
            ));
        }
    }

    Ok(())
}

fn number(value: &str) -> Option<f64> {
    match value {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => None,
        other => other.trim_start_matches('+').parse().ok(),
    }
}

/// Significant total and fraction digits of a decimal lexical value
fn digits(value: &str) -> (usize, usize) {
    let unsigned = value.trim_start_matches(['+', '-']);
    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let integer = integer.trim_start_matches('0');
    let fraction = fraction.trim_end_matches('0');
    (integer.len() + fraction.len(), fraction.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::xsd::model::{Pattern, QName};

    fn schema_with(name: &str, simple: SimpleType) -> Schema {
        let mut schema = Schema::default();
        schema
            .types
            .insert(QName::new(None, name), TypeDef::Simple(simple));
        schema
    }

    fn named(name: &str) -> SimpleTypeRef {
        SimpleTypeRef::Named(QName::new(None, name))
    }

    fn xsd(name: &str) -> SimpleTypeRef {
        SimpleTypeRef::Named(QName::xsd(name))
    }

    fn message(result: Result<String, Violation>) -> String {
        match result {
            Err(Violation::Invalid(message)) => message,
            other => panic!("expected an invalid value, got {other:?}"),
        }
    }

    #[test]
    fn test_builtins() {
        let schema = Schema::default();
        let types = Datatypes::new(&schema);
        assert!(types.check(Some(&xsd("integer")), " 42 ").is_ok());
        assert!(types.check(Some(&xsd("byte")), "128").is_err());
        assert!(types.check(Some(&xsd("positiveInteger")), "0").is_err());
        assert!(types.check(Some(&xsd("boolean")), "yes").is_err());
        assert!(types.check(Some(&xsd("date")), "2024-02-29").is_ok());
        assert!(types.check(Some(&xsd("date")), "2024-13-01").is_err());
        assert!(types.check(Some(&xsd("dateTime")), "2024-01-01T10:00:00Z").is_ok());
        assert!(types.check(Some(&xsd("language")), "en-GB").is_ok());
        assert!(types.check(Some(&xsd("NCName")), "a:b").is_err());
        assert!(types.check(Some(&xsd("duration")), "P").is_err());
        assert!(types.check(Some(&xsd("duration")), "P1DT2H").is_ok());
        assert_eq!(types.check(Some(&xsd("token")), " a \n b ").unwrap(), "a b");
        assert_eq!(types.check(Some(&xsd("string")), " a ").unwrap(), " a ");

        let error = message(types.check(Some(&xsd("int")), "x"));
        assert_eq!(error, "cvc-datatype-valid.1.2.1: 'x' is not a valid value for 'int'.");
    }

    #[test]
    fn test_enumeration_and_pattern() {
        let facets = Facets {
            enumeration: vec!["ok".to_string(), "fine".to_string()],
            ..Facets::default()
        };
        let schema = schema_with(
            "Status",
            SimpleType::Restriction {
                base: xsd("string"),
                facets,
            },
        );
        let types = Datatypes::new(&schema);
        assert!(types.check(Some(&named("Status")), "ok").is_ok());
        let error = message(types.check(Some(&named("Status")), "bad"));
        assert!(error.starts_with("cvc-enumeration-valid: Value 'bad'"));
        assert!(error.contains("[ok, fine]"));

        let facets = Facets {
            patterns: vec![Pattern {
                source: "[A-Z]{2}".to_string(),
                regex: Regex::new("^(?:[A-Z]{2})$").unwrap(),
            }],
            ..Facets::default()
        };
        let schema = schema_with(
            "Code",
            SimpleType::Restriction {
                base: xsd("token"),
                facets,
            },
        );
        let types = Datatypes::new(&schema);
        assert!(types.check(Some(&named("Code")), " NL ").is_ok());
        let error = message(types.check(Some(&named("Code")), "nl"));
        assert!(error.contains("pattern '[A-Z]{2}' for type 'Code'"));
    }

    #[test]
    fn test_bounds_lengths_and_digits() {
        let facets = Facets {
            min_inclusive: Some("1".to_string()),
            max_exclusive: Some("10".to_string()),
            total_digits: Some(3),
            fraction_digits: Some(1),
            ..Facets::default()
        };
        let schema = schema_with(
            "Score",
            SimpleType::Restriction {
                base: xsd("decimal"),
                facets,
            },
        );
        let types = Datatypes::new(&schema);
        assert!(types.check(Some(&named("Score")), "9.5").is_ok());
        assert!(message(types.check(Some(&named("Score")), "10")).starts_with("cvc-maxExclusive-valid"));
        assert!(message(types.check(Some(&named("Score")), "0.5")).starts_with("cvc-minInclusive-valid"));
        assert!(message(types.check(Some(&named("Score")), "2.25")).starts_with("cvc-fractionDigits-valid"));
        assert!(message(types.check(Some(&named("Score")), "1.001")).starts_with("cvc-totalDigits-valid"));

        let facets = Facets {
            min_length: Some(2),
            ..Facets::default()
        };
        let list = SimpleType::Restriction {
            base: SimpleTypeRef::Inline(Box::new(SimpleType::List { item: xsd("integer") })),
            facets,
        };
        let schema = schema_with("Numbers", list);
        let types = Datatypes::new(&schema);
        assert!(types.check(Some(&named("Numbers")), "1 2").is_ok());
        assert!(message(types.check(Some(&named("Numbers")), "1")).starts_with("cvc-minLength-valid"));
        assert!(message(types.check(Some(&named("Numbers")), "1 x")).starts_with("cvc-datatype-valid"));
    }

    #[test]
    fn test_union() {
        let schema = schema_with(
            "Size",
            SimpleType::Union {
                members: vec![xsd("integer"), xsd("boolean")],
            },
        );
        let types = Datatypes::new(&schema);
        assert!(types.check(Some(&named("Size")), "5").is_ok());
        assert!(types.check(Some(&named("Size")), "true").is_ok());
        assert!(message(types.check(Some(&named("Size")), "big")).starts_with("cvc-datatype-valid.1.2.3"));
    }

    #[test]
    fn test_unknown_type_is_a_grammar_problem() {
        let schema = Schema::default();
        let types = Datatypes::new(&schema);
        assert!(matches!(
            types.check(Some(&named("Missing")), "x"),
            Err(Violation::Grammar(_))
        ));
        assert!(!types.resolves(&named("Missing")));
        assert!(types.resolves(&xsd("string")));
    }
}
