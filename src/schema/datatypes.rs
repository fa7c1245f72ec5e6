//! Built-in XSD datatypes and facet checking for simple values.

use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use super::model::{ComplexType, ContentModel, Facets, SimpleType, SimpleVariety, TypeRef, WhiteSpace, XS_NS};

/// Maximum depth followed through derivation chains before giving up.
const MAX_DERIVATION_DEPTH: usize = 32;

/// A type reference resolved against the schema set.
#[derive(Debug, Clone)]
pub enum ResolvedType {
    Builtin(Builtin),
    Simple(Arc<SimpleType>),
    Complex(Arc<ComplexType>),
}

/// Resolves named type references; implemented by the schema set.
pub trait TypeResolver {
    fn resolve_type(&self, type_ref: &TypeRef) -> Option<ResolvedType>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
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
    Boolean,
    Decimal,
    Integer,
    NonPositiveInteger,
    NegativeInteger,
    Long,
    Int,
    Short,
    Byte,
    NonNegativeInteger,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    PositiveInteger,
    Float,
    Double,
    Duration,
    DateTime,
    Time,
    Date,
    GYearMonth,
    GYear,
    GMonthDay,
    GDay,
    GMonth,
    HexBinary,
    Base64Binary,
    AnyUri,
    QName,
    Notation,
}

impl Builtin {
    pub fn from_local(local: &str) -> Option<Self> {
        let builtin = match local {
            "anySimpleType" => Builtin::AnySimpleType,
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
            "boolean" => Builtin::Boolean,
            "decimal" => Builtin::Decimal,
            "integer" => Builtin::Integer,
            "nonPositiveInteger" => Builtin::NonPositiveInteger,
            "negativeInteger" => Builtin::NegativeInteger,
            "long" => Builtin::Long,
            "int" => Builtin::Int,
            "short" => Builtin::Short,
            "byte" => Builtin::Byte,
            "nonNegativeInteger" => Builtin::NonNegativeInteger,
            "unsignedLong" => Builtin::UnsignedLong,
            "unsignedInt" => Builtin::UnsignedInt,
            "unsignedShort" => Builtin::UnsignedShort,
            "unsignedByte" => Builtin::UnsignedByte,
            "positiveInteger" => Builtin::PositiveInteger,
            "float" => Builtin::Float,
            "double" => Builtin::Double,
            "duration" => Builtin::Duration,
            "dateTime" => Builtin::DateTime,
            "time" => Builtin::Time,
            "date" => Builtin::Date,
            "gYearMonth" => Builtin::GYearMonth,
            "gYear" => Builtin::GYear,
            "gMonthDay" => Builtin::GMonthDay,
            "gDay" => Builtin::GDay,
            "gMonth" => Builtin::GMonth,
            "hexBinary" => Builtin::HexBinary,
            "base64Binary" => Builtin::Base64Binary,
            "anyURI" => Builtin::AnyUri,
            "QName" => Builtin::QName,
            "NOTATION" => Builtin::Notation,
            _ => return None,
        };
        Some(builtin)
    }

    pub fn local_name(self) -> &'static str {
        match self {
            Builtin::AnySimpleType => "anySimpleType",
            Builtin::String => "string",
            Builtin::NormalizedString => "normalizedString",
            Builtin::Token => "token",
            Builtin::Language => "language",
            Builtin::Name => "Name",
            Builtin::NcName => "NCName",
            Builtin::Id => "ID",
            Builtin::IdRef => "IDREF",
            Builtin::IdRefs => "IDREFS",
            Builtin::Entity => "ENTITY",
            Builtin::Entities => "ENTITIES",
            Builtin::NmToken => "NMTOKEN",
            Builtin::NmTokens => "NMTOKENS",
            Builtin::Boolean => "boolean",
            Builtin::Decimal => "decimal",
            Builtin::Integer => "integer",
            Builtin::NonPositiveInteger => "nonPositiveInteger",
            Builtin::NegativeInteger => "negativeInteger",
            Builtin::Long => "long",
            Builtin::Int => "int",
            Builtin::Short => "short",
            Builtin::Byte => "byte",
            Builtin::NonNegativeInteger => "nonNegativeInteger",
            Builtin::UnsignedLong => "unsignedLong",
            Builtin::UnsignedInt => "unsignedInt",
            Builtin::UnsignedShort => "unsignedShort",
            Builtin::UnsignedByte => "unsignedByte",
            Builtin::PositiveInteger => "positiveInteger",
            Builtin::Float => "float",
            Builtin::Double => "double",
            Builtin::Duration => "duration",
            Builtin::DateTime => "dateTime",
            Builtin::Time => "time",
            Builtin::Date => "date",
            Builtin::GYearMonth => "gYearMonth",
            Builtin::GYear => "gYear",
            Builtin::GMonthDay => "gMonthDay",
            Builtin::GDay => "gDay",
            Builtin::GMonth => "gMonth",
            Builtin::HexBinary => "hexBinary",
            Builtin::Base64Binary => "base64Binary",
            Builtin::AnyUri => "anyURI",
            Builtin::QName => "QName",
            Builtin::Notation => "NOTATION",
        }
    }

    /// Datatype label used in messages, `namespace:local`.
    pub fn label(self) -> String {
        format!("{}:{}", XS_NS, self.local_name())
    }

    pub fn white_space(self) -> WhiteSpace {
        match self {
            Builtin::String | Builtin::AnySimpleType => WhiteSpace::Preserve,
            Builtin::NormalizedString => WhiteSpace::Replace,
            _ => WhiteSpace::Collapse,
        }
    }

    fn integer_range(self) -> Option<(i128, i128)> {
        let range = match self {
            Builtin::Integer => (i128::MIN, i128::MAX),
            Builtin::NonPositiveInteger => (i128::MIN, 0),
            Builtin::NegativeInteger => (i128::MIN, -1),
            Builtin::Long => (i64::MIN as i128, i64::MAX as i128),
            Builtin::Int => (i32::MIN as i128, i32::MAX as i128),
            Builtin::Short => (i16::MIN as i128, i16::MAX as i128),
            Builtin::Byte => (i8::MIN as i128, i8::MAX as i128),
            Builtin::NonNegativeInteger => (0, i128::MAX),
            Builtin::UnsignedLong => (0, u64::MAX as i128),
            Builtin::UnsignedInt => (0, u32::MAX as i128),
            Builtin::UnsignedShort => (0, u16::MAX as i128),
            Builtin::UnsignedByte => (0, u8::MAX as i128),
            Builtin::PositiveInteger => (1, i128::MAX),
            _ => return None,
        };
        Some(range)
    }

    pub fn is_numeric(self) -> bool {
        self.integer_range().is_some()
            || matches!(self, Builtin::Decimal | Builtin::Float | Builtin::Double)
    }

    fn is_chronological(self) -> bool {
        matches!(
            self,
            Builtin::DateTime
                | Builtin::Time
                | Builtin::Date
                | Builtin::GYearMonth
                | Builtin::GYear
                | Builtin::GMonthDay
                | Builtin::GDay
                | Builtin::GMonth
        )
    }

    fn is_list(self) -> bool {
        matches!(self, Builtin::IdRefs | Builtin::Entities | Builtin::NmTokens)
    }

    /// Check the lexical form of an already whitespace-normalized value.
    pub fn validate(self, value: &str) -> Result<(), String> {
        let valid = match self {
            Builtin::AnySimpleType | Builtin::String | Builtin::AnyUri => true,
            Builtin::NormalizedString => !value.contains(['\t', '\n', '\r']),
            Builtin::Token => {
                !value.contains(['\t', '\n', '\r'])
                    && !value.starts_with(' ')
                    && !value.ends_with(' ')
                    && !value.contains("  ")
            }
            Builtin::Language => language_regex().is_match(value),
            Builtin::Name => name_regex().is_match(value),
            Builtin::NcName | Builtin::Id | Builtin::IdRef | Builtin::Entity => {
                ncname_regex().is_match(value)
            }
            Builtin::NmToken => nmtoken_regex().is_match(value),
            Builtin::IdRefs | Builtin::Entities => {
                !value.is_empty() && value.split_whitespace().all(|v| ncname_regex().is_match(v))
            }
            Builtin::NmTokens => {
                !value.is_empty() && value.split_whitespace().all(|v| nmtoken_regex().is_match(v))
            }
            Builtin::QName | Builtin::Notation => qname_regex().is_match(value),
            Builtin::Boolean => matches!(value, "true" | "false" | "1" | "0"),
            Builtin::Decimal => decimal_regex().is_match(value),
            Builtin::Float | Builtin::Double => {
                float_regex().is_match(value) || matches!(value, "INF" | "-INF" | "+INF" | "NaN")
            }
            Builtin::Duration => is_duration(value),
            Builtin::DateTime => is_date_time(value),
            Builtin::Date => date_regex().captures(value).is_some_and(|c| {
                valid_day(&c["year"], &c["month"], &c["day"])
            }),
            Builtin::Time => time_regex().captures(value).is_some_and(|c| {
                valid_time(&c["hour"], &c["minute"], &c["second"])
            }),
            Builtin::GYearMonth => g_year_month_regex().is_match(value),
            Builtin::GYear => g_year_regex().is_match(value),
            Builtin::GMonthDay => g_month_day_regex().is_match(value),
            Builtin::GDay => g_day_regex().is_match(value),
            Builtin::GMonth => g_month_regex().is_match(value),
            Builtin::HexBinary => value.len() % 2 == 0 && value.chars().all(|c| c.is_ascii_hexdigit()),
            Builtin::Base64Binary => is_base64(value),
            integer => return validate_integer(integer, value),
        };

        if valid {
            Ok(())
        } else {
            Err(invalid_lexical(self, value))
        }
    }
}

fn invalid_lexical(builtin: Builtin, value: &str) -> String {
    format!(
        "The string '{}' is not a valid {} value.",
        value,
        builtin.local_name()
    )
}

fn validate_integer(builtin: Builtin, value: &str) -> Result<(), String> {
    if !integer_regex().is_match(value) {
        return Err(invalid_lexical(builtin, value));
    }
    let Some((min, max)) = builtin.integer_range() else {
        return Ok(());
    };
    match value.trim_start_matches('+').parse::<i128>() {
        Ok(n) if n < min || n > max => Err(format!(
            "Value '{}' was either too large or too small for {}.",
            value,
            builtin.local_name()
        )),
        Ok(_) => Ok(()),
        // Only unbounded types accept values beyond i128
        Err(_) if builtin == Builtin::Integer => Ok(()),
        Err(_) => Err(format!(
            "Value '{}' was either too large or too small for {}.",
            value,
            builtin.local_name()
        )),
    }
}

macro_rules! cached_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).expect("Failed to compile datatype regex"))
        }
    };
}

cached_regex!(integer_regex, r"^[+-]?[0-9]+$");
cached_regex!(decimal_regex, r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)$");
cached_regex!(float_regex, r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?$");
cached_regex!(language_regex, r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$");
cached_regex!(ncname_regex, r"^[\p{L}_][\p{L}\p{N}_.\-\u{B7}]*$");
cached_regex!(name_regex, r"^[\p{L}_:][\p{L}\p{N}_.:\-\u{B7}]*$");
cached_regex!(nmtoken_regex, r"^[\p{L}\p{N}_.:\-\u{B7}]+$");
cached_regex!(
    qname_regex,
    r"^([\p{L}_][\p{L}\p{N}_.\-]*:)?[\p{L}_][\p{L}\p{N}_.\-]*$"
);
cached_regex!(
    duration_regex,
    r"^-?P([0-9]+Y)?([0-9]+M)?([0-9]+D)?(T([0-9]+H)?([0-9]+M)?([0-9]+(\.[0-9]+)?S)?)?$"
);
cached_regex!(
    date_regex,
    r"^-?(?P<year>[0-9]{4,})-(?P<month>[0-9]{2})-(?P<day>[0-9]{2})(Z|[+-][0-9]{2}:[0-9]{2})?$"
);
cached_regex!(
    time_regex,
    r"^(?P<hour>[0-9]{2}):(?P<minute>[0-9]{2}):(?P<second>[0-9]{2}(\.[0-9]+)?)(Z|[+-][0-9]{2}:[0-9]{2})?$"
);
cached_regex!(
    g_year_month_regex,
    r"^-?[0-9]{4,}-(0[1-9]|1[0-2])(Z|[+-][0-9]{2}:[0-9]{2})?$"
);
cached_regex!(g_year_regex, r"^-?[0-9]{4,}(Z|[+-][0-9]{2}:[0-9]{2})?$");
cached_regex!(
    g_month_day_regex,
    r"^--(0[1-9]|1[0-2])-(0[1-9]|[12][0-9]|3[01])(Z|[+-][0-9]{2}:[0-9]{2})?$"
);
cached_regex!(
    g_day_regex,
    r"^---(0[1-9]|[12][0-9]|3[01])(Z|[+-][0-9]{2}:[0-9]{2})?$"
);
cached_regex!(g_month_regex, r"^--(0[1-9]|1[0-2])(Z|[+-][0-9]{2}:[0-9]{2})?$");

fn is_duration(value: &str) -> bool {
    duration_regex().is_match(value)
        && !value.ends_with('P')
        && !value.ends_with('T')
}

fn is_date_time(value: &str) -> bool {
    let Some((date, time)) = value.split_once('T') else {
        return false;
    };
    let Some(date_caps) = date_regex().captures(date) else {
        return false;
    };
    let Some(time_caps) = time_regex().captures(time) else {
        return false;
    };
    valid_day(&date_caps["year"], &date_caps["month"], &date_caps["day"])
        && valid_time(&time_caps["hour"], &time_caps["minute"], &time_caps["second"])
}

fn valid_day(year: &str, month: &str, day: &str) -> bool {
    let (Ok(year), Ok(month), Ok(day)) = (year.parse::<i64>(), month.parse::<u32>(), day.parse::<u32>())
    else {
        return false;
    };
    let days_in_month = match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        _ => return false,
    };
    (1..=days_in_month).contains(&day)
}

fn valid_time(hour: &str, minute: &str, second: &str) -> bool {
    let (Ok(hour), Ok(minute), Ok(second)) =
        (hour.parse::<u32>(), minute.parse::<u32>(), second.parse::<f64>())
    else {
        return false;
    };
    if hour == 24 {
        return minute == 0 && second == 0.0;
    }
    hour < 24 && minute < 60 && second < 60.0
}

fn is_base64(value: &str) -> bool {
    let compact: Vec<char> = value.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() % 4 != 0 {
        return false;
    }
    let padding = compact.iter().rev().take_while(|&&c| c == '=').count();
    padding <= 2
        && compact[..compact.len() - padding]
            .iter()
            .all(|c| c.is_ascii_alphanumeric() || *c == '+' || *c == '/')
}

pub fn normalize(value: &str, white_space: WhiteSpace) -> String {
    match white_space {
        WhiteSpace::Preserve => value.to_string(),
        WhiteSpace::Replace => value.replace(['\t', '\n', '\r'], " "),
        WhiteSpace::Collapse => value.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

/// What a simple type ultimately constrains, used to interpret facets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    List,
    Atomic(Builtin),
    Union,
}

fn kind_of<R: TypeResolver + ?Sized>(resolver: &R, type_ref: &TypeRef, depth: usize) -> Option<ValueKind> {
    if depth > MAX_DERIVATION_DEPTH {
        return None;
    }
    match resolver.resolve_type(type_ref)? {
        ResolvedType::Builtin(b) if b.is_list() => Some(ValueKind::List),
        ResolvedType::Builtin(b) => Some(ValueKind::Atomic(b)),
        ResolvedType::Simple(st) => match &st.variety {
            SimpleVariety::Restriction { base, .. } => kind_of(resolver, base, depth + 1),
            SimpleVariety::List { .. } => Some(ValueKind::List),
            SimpleVariety::Union { .. } => Some(ValueKind::Union),
        },
        ResolvedType::Complex(ct) => match &ct.content {
            ContentModel::Simple(inner) => kind_of(resolver, inner, depth + 1),
            _ => None,
        },
    }
}

fn white_space_of<R: TypeResolver + ?Sized>(resolver: &R, type_ref: &TypeRef, depth: usize) -> WhiteSpace {
    if depth > MAX_DERIVATION_DEPTH {
        return WhiteSpace::Preserve;
    }
    match resolver.resolve_type(type_ref) {
        Some(ResolvedType::Builtin(b)) => b.white_space(),
        Some(ResolvedType::Simple(st)) => match &st.variety {
            SimpleVariety::Restriction { base, facets } => facets
                .white_space
                .unwrap_or_else(|| white_space_of(resolver, base, depth + 1)),
            SimpleVariety::List { .. } => WhiteSpace::Collapse,
            SimpleVariety::Union { .. } => WhiteSpace::Preserve,
        },
        Some(ResolvedType::Complex(ct)) => match &ct.content {
            ContentModel::Simple(inner) => white_space_of(resolver, inner, depth + 1),
            _ => WhiteSpace::Preserve,
        },
        None => WhiteSpace::Preserve,
    }
}

/// Label naming a type in messages: its own name, or the nearest named base.
pub fn type_label<R: TypeResolver + ?Sized>(resolver: &R, type_ref: &TypeRef) -> String {
    fn label<R: TypeResolver + ?Sized>(resolver: &R, type_ref: &TypeRef, depth: usize) -> String {
        if let TypeRef::Named(name) = type_ref {
            return name.to_string();
        }
        if depth > MAX_DERIVATION_DEPTH {
            return "anySimpleType".to_string();
        }
        match resolver.resolve_type(type_ref) {
            Some(ResolvedType::Simple(st)) => match &st.variety {
                SimpleVariety::Restriction { base, .. } => label(resolver, base, depth + 1),
                SimpleVariety::List { .. } => "List".to_string(),
                SimpleVariety::Union { .. } => "Union".to_string(),
            },
            Some(ResolvedType::Complex(ct)) => match &ct.content {
                ContentModel::Simple(inner) => label(resolver, inner, depth + 1),
                _ => "anyType".to_string(),
            },
            Some(ResolvedType::Builtin(b)) => b.label(),
            None => "anySimpleType".to_string(),
        }
    }
    label(resolver, type_ref, 0)
}

/// Validate a raw (unnormalized) value against a simple type.
///
/// Returns the detail sentence of the first constraint that fails. Types that
/// cannot be resolved accept every value.
pub fn validate_value<R: TypeResolver + ?Sized>(
    resolver: &R,
    type_ref: &TypeRef,
    raw: &str,
) -> Result<(), String> {
    check_value(resolver, type_ref, raw, 0)
}

fn check_value<R: TypeResolver + ?Sized>(
    resolver: &R,
    type_ref: &TypeRef,
    raw: &str,
    depth: usize,
) -> Result<(), String> {
    if depth > MAX_DERIVATION_DEPTH {
        return Ok(());
    }
    let Some(resolved) = resolver.resolve_type(type_ref) else {
        return Ok(());
    };

    match resolved {
        ResolvedType::Builtin(b) => b.validate(&normalize(raw, b.white_space())),
        ResolvedType::Complex(ct) => match &ct.content {
            ContentModel::Simple(inner) => check_value(resolver, inner, raw, depth + 1),
            _ => Ok(()),
        },
        ResolvedType::Simple(st) => match &st.variety {
            SimpleVariety::Restriction { base, facets } => {
                let white_space = facets
                    .white_space
                    .unwrap_or_else(|| white_space_of(resolver, base, depth + 1));
                let value = normalize(raw, white_space);
                check_value(resolver, base, &value, depth + 1)?;
                let kind = kind_of(resolver, base, depth + 1);
                check_facets(facets, &value, kind)
            }
            SimpleVariety::List { item } => {
                let value = normalize(raw, WhiteSpace::Collapse);
                for token in value.split_whitespace() {
                    check_value(resolver, item, token, depth + 1)?;
                }
                Ok(())
            }
            SimpleVariety::Union { members } => {
                if members
                    .iter()
                    .any(|member| check_value(resolver, member, raw, depth + 1).is_ok())
                {
                    Ok(())
                } else {
                    Err(format!(
                        "The value '{}' is not valid according to any of the memberTypes of the union.",
                        raw
                    ))
                }
            }
        },
    }
}

fn check_facets(facets: &Facets, value: &str, kind: Option<ValueKind>) -> Result<(), String> {
    let atomic = match kind {
        Some(ValueKind::Atomic(b)) => Some(b),
        _ => None,
    };

    if !facets.enumeration.is_empty()
        && !facets
            .enumeration
            .iter()
            .any(|allowed| values_equal(atomic, allowed, value))
    {
        return Err("The Enumeration constraint failed.".to_string());
    }

    if !facets.patterns.is_empty() && !facets.patterns.iter().any(|re| re.is_match(value)) {
        return Err("The Pattern constraint failed.".to_string());
    }

    let length = value_length(kind, value);
    if let Some(expected) = facets.length
        && length != expected
    {
        return Err("The actual length is not equal to the specified length.".to_string());
    }
    if let Some(min) = facets.min_length
        && length < min
    {
        return Err("The actual length is less than the MinLength value.".to_string());
    }
    if let Some(max) = facets.max_length
        && length > max
    {
        return Err("The actual length is greater than the MaxLength value.".to_string());
    }

    let bounds = [
        (&facets.min_inclusive, "MinInclusive", &[Ordering::Greater, Ordering::Equal][..]),
        (&facets.max_inclusive, "MaxInclusive", &[Ordering::Less, Ordering::Equal][..]),
        (&facets.min_exclusive, "MinExclusive", &[Ordering::Greater][..]),
        (&facets.max_exclusive, "MaxExclusive", &[Ordering::Less][..]),
    ];
    for (bound, facet_name, accepted) in bounds {
        if let Some(bound) = bound
            && let Some(ordering) = compare_values(atomic, value, bound)
            && !accepted.contains(&ordering)
        {
            return Err(format!("The {} constraint failed.", facet_name));
        }
    }

    if facets.total_digits.is_some() || facets.fraction_digits.is_some() {
        let (total, fraction) = digit_counts(value);
        if let Some(max) = facets.total_digits
            && total > max
        {
            return Err("The TotalDigits constraint failed.".to_string());
        }
        if let Some(max) = facets.fraction_digits
            && fraction > max
        {
            return Err("The FractionDigits constraint failed.".to_string());
        }
    }

    Ok(())
}

fn value_length(kind: Option<ValueKind>, value: &str) -> usize {
    match kind {
        Some(ValueKind::List) => value.split_whitespace().count(),
        Some(ValueKind::Atomic(Builtin::HexBinary)) => value.len() / 2,
        Some(ValueKind::Atomic(Builtin::Base64Binary)) => {
            let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
            let padding = compact.chars().rev().take_while(|&c| c == '=').count();
            compact.len() / 4 * 3 - padding.min(compact.len() / 4 * 3)
        }
        _ => value.chars().count(),
    }
}

fn values_equal(atomic: Option<Builtin>, allowed: &str, value: &str) -> bool {
    match atomic {
        Some(b) if b.is_numeric() => compare_numbers(allowed, value) == Some(Ordering::Equal),
        _ => allowed == value,
    }
}

fn compare_values(atomic: Option<Builtin>, value: &str, bound: &str) -> Option<Ordering> {
    match atomic {
        Some(b) if b.is_numeric() => compare_numbers(value, bound),
        Some(b) if b.is_chronological() => Some(value.cmp(bound)),
        _ => None,
    }
}

fn compare_numbers(a: &str, b: &str) -> Option<Ordering> {
    let a = a.trim().trim_start_matches('+');
    let b = b.trim().trim_start_matches('+');
    if let (Ok(x), Ok(y)) = (a.parse::<i128>(), b.parse::<i128>()) {
        return Some(x.cmp(&y));
    }
    let x = a.parse::<f64>().ok()?;
    let y = b.parse::<f64>().ok()?;
    x.partial_cmp(&y)
}

fn digit_counts(value: &str) -> (u32, u32) {
    let unsigned = value.trim_start_matches(['+', '-']);
    let (integral, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let integral = integral.trim_start_matches('0');
    let fraction = fraction.trim_end_matches('0');
    let total = (integral.len() + fraction.len()).max(1) as u32;
    (total, fraction.len() as u32)
}

/// Translate an XSD regular expression into an anchored `regex` pattern.
///
/// `^` and `$` are literals in XSD. Class subtraction `[a-z-[aeiou]]` maps
/// to the `--` difference operator.
pub fn translate_pattern(pattern: &str) -> String {
    let mut translated = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars().peekable();
    let mut class_depth = 0usize;
    while let Some(c) = chars.next() {
        let in_class = class_depth > 0;
        match c {
            '\\' => match chars.next() {
                Some('i') if in_class => translated.push_str("_:A-Za-z"),
                Some('c') if in_class => translated.push_str("\\-._:A-Za-z0-9"),
                Some('i') => translated.push_str("[_:A-Za-z]"),
                Some('I') => translated.push_str("[^_:A-Za-z]"),
                Some('c') => translated.push_str("[\\-._:A-Za-z0-9]"),
                Some('C') => translated.push_str("[^\\-._:A-Za-z0-9]"),
                Some(other) => {
                    translated.push('\\');
                    translated.push(other);
                }
                None => translated.push_str("\\\\"),
            },
            '[' => {
                class_depth += 1;
                translated.push(c);
            }
            '-' if in_class && chars.peek() == Some(&'[') => translated.push_str("--"),
            ']' if in_class => {
                class_depth -= 1;
                translated.push(c);
            }
            '^' | '$' if !in_class => {
                translated.push('\\');
                translated.push(c);
            }
            _ => translated.push(c),
        }
    }
    format!("^(?:{})$", translated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::model::QualifiedName;

    struct BuiltinsOnly;

    impl TypeResolver for BuiltinsOnly {
        fn resolve_type(&self, type_ref: &TypeRef) -> Option<ResolvedType> {
            match type_ref {
                TypeRef::Named(name) if name.namespace == XS_NS => {
                    Builtin::from_local(&name.local).map(ResolvedType::Builtin)
                }
                TypeRef::Simple(st) => Some(ResolvedType::Simple(st.clone())),
                TypeRef::Complex(ct) => Some(ResolvedType::Complex(ct.clone())),
                TypeRef::Named(_) => None,
            }
        }
    }

    fn restricted(base: &str, facets: Facets) -> TypeRef {
        TypeRef::Simple(Arc::new(SimpleType {
            name: None,
            variety: SimpleVariety::Restriction {
                base: TypeRef::Named(QualifiedName::xs(base)),
                facets,
            },
        }))
    }

    #[test]
    fn test_integer_values() {
        let int = TypeRef::Named(QualifiedName::xs("int"));
        assert!(validate_value(&BuiltinsOnly, &int, " 42 ").is_ok());
        assert!(validate_value(&BuiltinsOnly, &int, "-7").is_ok());

        let err = validate_value(&BuiltinsOnly, &int, "abc").unwrap_err();
        assert_eq!(err, "The string 'abc' is not a valid int value.");

        assert!(validate_value(&BuiltinsOnly, &int, "3000000000").is_err());
        let byte = TypeRef::Named(QualifiedName::xs("unsignedByte"));
        assert!(validate_value(&BuiltinsOnly, &byte, "255").is_ok());
        assert!(validate_value(&BuiltinsOnly, &byte, "256").is_err());
    }

    #[test]
    fn test_dates_and_booleans() {
        assert!(Builtin::Date.validate("2024-02-29").is_ok());
        assert!(Builtin::Date.validate("2023-02-29").is_err());
        assert!(Builtin::DateTime.validate("2024-01-31T23:59:59.5Z").is_ok());
        assert!(Builtin::DateTime.validate("2024-01-31 23:59:59").is_err());
        assert!(Builtin::Time.validate("24:00:00").is_ok());
        assert!(Builtin::Duration.validate("P1Y2M3DT4H").is_ok());
        assert!(Builtin::Duration.validate("P").is_err());
        assert!(Builtin::Duration.validate("P1DT").is_err());
        assert!(Builtin::Boolean.validate("1").is_ok());
        assert!(Builtin::Boolean.validate("yes").is_err());
    }

    #[test]
    fn test_binary_and_names() {
        assert!(Builtin::HexBinary.validate("0fA9").is_ok());
        assert!(Builtin::HexBinary.validate("0fA").is_err());
        assert!(Builtin::Base64Binary.validate("aGVsbG8=").is_ok());
        assert!(Builtin::Base64Binary.validate("aGVsbG8").is_err());
        assert!(Builtin::NcName.validate("item-1").is_ok());
        assert!(Builtin::NcName.validate("1item").is_err());
        assert!(Builtin::QName.validate("xs:string").is_ok());
        assert!(Builtin::Float.validate("1.5e3").is_ok());
        assert!(Builtin::Float.validate("INF").is_ok());
        assert!(Builtin::Float.validate("inf").is_err());
    }

    #[test]
    fn test_enumeration_and_pattern_facets() {
        let colour = restricted(
            "string",
            Facets {
                enumeration: vec!["red".to_string(), "green".to_string()],
                ..Facets::default()
            },
        );
        assert!(validate_value(&BuiltinsOnly, &colour, "red").is_ok());
        assert_eq!(
            validate_value(&BuiltinsOnly, &colour, "blue").unwrap_err(),
            "The Enumeration constraint failed."
        );

        let code = restricted(
            "string",
            Facets {
                patterns: vec![Regex::new(&translate_pattern("[A-Z]{3}")).unwrap()],
                ..Facets::default()
            },
        );
        assert!(validate_value(&BuiltinsOnly, &code, "ABC").is_ok());
        assert_eq!(
            validate_value(&BuiltinsOnly, &code, "ABCD").unwrap_err(),
            "The Pattern constraint failed."
        );
    }

    #[test]
    fn test_range_and_length_facets() {
        let percent = restricted(
            "integer",
            Facets {
                min_inclusive: Some("0".to_string()),
                max_inclusive: Some("100".to_string()),
                ..Facets::default()
            },
        );
        assert!(validate_value(&BuiltinsOnly, &percent, "100").is_ok());
        assert_eq!(
            validate_value(&BuiltinsOnly, &percent, "101").unwrap_err(),
            "The MaxInclusive constraint failed."
        );
        assert_eq!(
            validate_value(&BuiltinsOnly, &percent, "-1").unwrap_err(),
            "The MinInclusive constraint failed."
        );

        let short_text = restricted(
            "string",
            Facets {
                max_length: Some(3),
                ..Facets::default()
            },
        );
        assert!(validate_value(&BuiltinsOnly, &short_text, "abc").is_ok());
        assert_eq!(
            validate_value(&BuiltinsOnly, &short_text, "abcd").unwrap_err(),
            "The actual length is greater than the MaxLength value."
        );

        let price = restricted(
            "decimal",
            Facets {
                total_digits: Some(5),
                fraction_digits: Some(2),
                ..Facets::default()
            },
        );
        assert!(validate_value(&BuiltinsOnly, &price, "123.45").is_ok());
        assert!(validate_value(&BuiltinsOnly, &price, "123.456").is_err());
        assert!(validate_value(&BuiltinsOnly, &price, "1234.5").is_ok());
        assert!(validate_value(&BuiltinsOnly, &price, "1234.56").is_err());
        assert!(validate_value(&BuiltinsOnly, &price, "123456").is_err());
    }

    #[test]
    fn test_list_and_union() {
        let list = TypeRef::Simple(Arc::new(SimpleType {
            name: None,
            variety: SimpleVariety::List {
                item: TypeRef::Named(QualifiedName::xs("int")),
            },
        }));
        assert!(validate_value(&BuiltinsOnly, &list, "1 2  3").is_ok());
        assert!(validate_value(&BuiltinsOnly, &list, "1 two 3").is_err());

        let union = TypeRef::Simple(Arc::new(SimpleType {
            name: None,
            variety: SimpleVariety::Union {
                members: vec![
                    TypeRef::Named(QualifiedName::xs("int")),
                    TypeRef::Named(QualifiedName::xs("boolean")),
                ],
            },
        }));
        assert!(validate_value(&BuiltinsOnly, &union, "true").is_ok());
        assert!(validate_value(&BuiltinsOnly, &union, "12").is_ok());
        assert!(validate_value(&BuiltinsOnly, &union, "maybe").is_err());
    }

    #[test]
    fn test_type_label() {
        let int = TypeRef::Named(QualifiedName::xs("int"));
        assert_eq!(
            type_label(&BuiltinsOnly, &int),
            "http://www.w3.org/2001/XMLSchema:int"
        );
        let anonymous = restricted("string", Facets::default());
        assert_eq!(
            type_label(&BuiltinsOnly, &anonymous),
            "http://www.w3.org/2001/XMLSchema:string"
        );
    }

    #[test]
    fn test_translate_pattern() {
        assert_eq!(translate_pattern("\\i\\c*"), "^(?:[_:A-Za-z][\\-._:A-Za-z0-9]*)$");
        assert!(Regex::new(&translate_pattern("[\\i]+")).is_ok());
    }

    #[test]
    fn test_pattern_anchors_are_literal() {
        assert_eq!(translate_pattern("$[0-9]+"), "^(?:\\$[0-9]+)$");
        let price = Regex::new(&translate_pattern("$[0-9]+")).unwrap();
        assert!(price.is_match("$5"));
        assert!(!price.is_match("5"));

        let caret = Regex::new(&translate_pattern("a^b")).unwrap();
        assert!(caret.is_match("a^b"));
        // Negation inside a class is untouched
        let not_digit = Regex::new(&translate_pattern("[^0-9]+")).unwrap();
        assert!(not_digit.is_match("abc"));
        assert!(!not_digit.is_match("a1"));
    }

    #[test]
    fn test_pattern_class_subtraction() {
        assert_eq!(translate_pattern("[a-z-[aeiou]]+"), "^(?:[a-z--[aeiou]]+)$");
        let consonants = Regex::new(&translate_pattern("[a-z-[aeiou]]+")).unwrap();
        assert!(consonants.is_match("xyz"));
        assert!(!consonants.is_match("a"));
        assert!(!consonants.is_match("bad"));

        let word = restricted(
            "string",
            Facets {
                patterns: vec![consonants],
                ..Facets::default()
            },
        );
        assert_eq!(
            validate_value(&BuiltinsOnly, &word, "a").unwrap_err(),
            "The Pattern constraint failed."
        );
    }
}
