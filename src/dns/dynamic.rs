//! Dynamic record text format
//!
//! The edit payloads of the HTTP control plane: newline-separated zone lines
//! with an optional annotation section after a `;` (`ID:<n>`, `Volatile`) and
//! a leading `;` marking a line as disabled ("delete this" on POST). Lines
//! starting with `;` that do not parse as a disabled record are comments.

use std::fmt;
use std::str::FromStr;

use crate::dns::record::Record;
use crate::error::{Error, ErrorSet, Result};

/// A record in the dynamic zone: the record itself plus its store identity
/// and lifecycle markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicRecord {
    pub record: Record,
    /// Store-assigned ID; present on listings, optional on edit payloads.
    pub id: Option<i64>,
    /// TTL-bounded lifetime; the store expires the record after its TTL.
    pub volatile: bool,
    /// Edit-payload marker meaning "delete this record".
    pub disabled: bool,
}

impl DynamicRecord {
    pub fn new(record: Record) -> Self {
        Self {
            record,
            id: None,
            volatile: false,
            disabled: false,
        }
    }
}

impl fmt::Display for DynamicRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.disabled {
            write!(f, ";")?;
        }
        write!(f, "{}", self.record)?;

        let mut annotations = Vec::new();
        if let Some(id) = self.id {
            annotations.push(format!("ID:{}", id));
        }
        if self.volatile {
            annotations.push("Volatile".to_string());
        }
        if !annotations.is_empty() {
            write!(f, " ; {}", annotations.join(" "))?;
        }
        Ok(())
    }
}

/// Split a line body into the record part and the annotation part, honoring
/// the quoted RDATA of TXT records.
fn split_annotations(body: &str) -> (&str, Option<&str>) {
    let mut in_quotes = false;
    for (i, c) in body.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return (&body[..i], Some(&body[i + 1..])),
            _ => {}
        }
    }
    (body, None)
}

fn parse_annotations(annotations: &str) -> Result<(Option<i64>, bool)> {
    let mut id = None;
    let mut volatile = false;

    for token in annotations.split_whitespace() {
        match token.split_once(':') {
            Some((key, value)) if key.eq_ignore_ascii_case("id") => {
                id = Some(value.parse().map_err(|_| {
                    Error::Argument(format!("invalid ID annotation: \"{}\"", token))
                })?);
            }
            None if token.eq_ignore_ascii_case("id") => {
                return Err(Error::Argument(format!(
                    "invalid ID annotation: \"{}\"",
                    token
                )));
            }
            None if token.eq_ignore_ascii_case("volatile") => volatile = true,
            // unknown annotations are ignored for forward compatibility
            _ => {}
        }
    }

    Ok((id, volatile))
}

impl FromStr for DynamicRecord {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match parse_line(s)? {
            Some(record) => Ok(record),
            None => Err(Error::Argument(format!("invalid format: {}", s.trim()))),
        }
    }
}

/// Parse one payload line. `Ok(None)` means the line is blank or a comment.
pub fn parse_line(line: &str) -> Result<Option<DynamicRecord>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let (disabled, body) = match trimmed.strip_prefix(';') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, trimmed),
    };

    let (record_part, annotation_part) = split_annotations(body);

    let parsed: Result<DynamicRecord> = (|| {
        let record: Record = record_part.trim().parse()?;
        let (id, volatile) = match annotation_part {
            Some(annotations) => parse_annotations(annotations)?,
            None => (None, false),
        };
        Ok(DynamicRecord {
            record,
            id,
            volatile,
            disabled,
        })
    })();

    match parsed {
        Ok(record) => Ok(Some(record)),
        // a ;-led line that is not a disabled record is a comment
        Err(_) if disabled => Ok(None),
        Err(err) => Err(err),
    }
}

/// An ordered set of dynamic records, the unit of edit payloads and listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicRecordSet(pub Vec<DynamicRecord>);

impl DynamicRecordSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, record: DynamicRecord) {
        self.0.push(record);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DynamicRecord> {
        self.0.iter()
    }

    /// Flip the disabled flag of every entry; the HTTP DELETE verb applies a
    /// payload with inverted meaning.
    pub fn invert_disabled(&mut self) {
        for record in &mut self.0 {
            record.disabled = !record.disabled;
        }
    }
}

impl IntoIterator for DynamicRecordSet {
    type Item = DynamicRecord;
    type IntoIter = std::vec::IntoIter<DynamicRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromStr for DynamicRecordSet {
    type Err = Error;

    /// Parse a multi-line payload. Per-line failures accumulate into an
    /// aggregate error with `line N:` prefixes; any failure rejects the whole
    /// payload.
    fn from_str(s: &str) -> Result<Self> {
        let mut set = DynamicRecordSet::new();
        let mut errors = ErrorSet::new();

        for (index, line) in s.lines().enumerate() {
            match parse_line(line) {
                Ok(Some(record)) => set.push(record),
                Ok(None) => {}
                Err(_) => errors.push(Error::Argument(format!(
                    "line {}: invalid format: {}",
                    index + 1,
                    line.trim()
                ))),
            }
        }

        errors.into_result()?;
        Ok(set)
    }
}

impl fmt::Display for DynamicRecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in &self.0 {
            writeln!(f, "{}", record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_line() {
        let r: DynamicRecord = "example.com. 42 IN A 127.0.0.1".parse().unwrap();
        assert!(!r.disabled);
        assert!(!r.volatile);
        assert_eq!(r.id, None);
        assert_eq!(r.to_string(), "example.com. 42 IN A 127.0.0.1");
    }

    #[test]
    fn test_parse_annotations() {
        let r: DynamicRecord = "example.com. 42 IN A 127.0.0.1 ; ID:3 Volatile"
            .parse()
            .unwrap();
        assert_eq!(r.id, Some(3));
        assert!(r.volatile);
        assert_eq!(r.to_string(), "example.com. 42 IN A 127.0.0.1 ; ID:3 Volatile");

        // keys are case-insensitive, unknown tokens are ignored
        let r: DynamicRecord = "example.com. 42 IN A 127.0.0.1 ; id:7 VOLATILE Future:stuff"
            .parse()
            .unwrap();
        assert_eq!(r.id, Some(7));
        assert!(r.volatile);
    }

    #[test]
    fn test_parse_disabled_line() {
        let r = parse_line(";example.com. 42 IN A 127.0.0.1 ; ID:2")
            .unwrap()
            .unwrap();
        assert!(r.disabled);
        assert_eq!(r.id, Some(2));
        assert_eq!(r.to_string(), ";example.com. 42 IN A 127.0.0.1 ; ID:2");
    }

    #[test]
    fn test_comment_lines_skipped() {
        assert!(parse_line("").unwrap().is_none());
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("; this is a comment").unwrap().is_none());
        assert!(parse_line("  ; indented comment").unwrap().is_none());
    }

    #[test]
    fn test_malformed_id_is_error() {
        assert!("example.com. 42 IN A 127.0.0.1 ; ID:".parse::<DynamicRecord>().is_err());
        assert!("example.com. 42 IN A 127.0.0.1 ; ID:abc".parse::<DynamicRecord>().is_err());
        assert!("example.com. 42 IN A 127.0.0.1 ; ID".parse::<DynamicRecord>().is_err());
    }

    #[test]
    fn test_txt_rdata_may_contain_semicolon() {
        let r: DynamicRecord = "example.com. 42 IN TXT \"a;b\" ; ID:1".parse().unwrap();
        match &r.record {
            Record::Txt(t) => assert_eq!(t.text, "a;b"),
            _ => panic!("expected TXT"),
        }
        assert_eq!(r.id, Some(1));
    }

    #[test]
    fn test_parse_set_accumulates_errors() {
        let payload = "example.com. 42 IN A 127.0.0.1\nbogus line\n\nanother bad one\n";
        let err = payload.parse::<DynamicRecordSet>().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("line 2: invalid format: bogus line"), "{}", text);
        assert!(text.contains("line 4: invalid format: another bad one"), "{}", text);
    }

    #[test]
    fn test_all_comment_payload_is_empty_set() {
        let set: DynamicRecordSet = "; nothing here\n\n; still nothing\n".parse().unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_print_parse_round_trip() {
        let payload = concat!(
            "a.example.com. 42 IN A 127.0.0.1 ; ID:1\n",
            "1.0.0.127.in-addr.arpa. 42 IN PTR a.example.com. ; ID:2\n",
            ";old.example.com. 10 IN TXT \"gone\" ; ID:3\n",
            "short.example.com. 1 IN TXT \"x\" ; Volatile\n",
        );
        let set: DynamicRecordSet = payload.parse().unwrap();
        assert_eq!(set.len(), 4);
        assert_eq!(set.to_string(), payload);
        let reparsed: DynamicRecordSet = set.to_string().parse().unwrap();
        assert_eq!(reparsed, set);
    }

    #[test]
    fn test_invert_disabled() {
        let mut set: DynamicRecordSet =
            "a.example.com. 42 IN A 127.0.0.1\n;b.example.com. 42 IN A 127.0.0.2\n"
                .parse()
                .unwrap();
        set.invert_disabled();
        assert!(set.0[0].disabled);
        assert!(!set.0[1].disabled);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn domain_strategy() -> impl Strategy<Value = String> {
        let label = "[a-z][a-z0-9]{0,9}";
        (label, label).prop_map(|(l1, l2)| format!("{}.{}.", l1, l2))
    }

    fn line_strategy() -> impl Strategy<Value = String> {
        (
            domain_strategy(),
            1u32..86400,
            prop_oneof![
                (any::<u8>(), any::<u8>(), any::<u8>(), any::<u8>())
                    .prop_map(|(a, b, c, d)| format!("A {}.{}.{}.{}", a, b, c, d)),
                domain_strategy().prop_map(|d| format!("CNAME {}", d)),
                "[a-z0-9 ]{0,20}".prop_map(|t| format!("TXT \"{}\"", t)),
            ],
            proptest::option::of(1i64..10_000),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(name, ttl, rdata, id, volatile, disabled)| {
                let mut line = String::new();
                if disabled {
                    line.push(';');
                }
                line.push_str(&format!("{} {} IN {}", name, ttl, rdata));
                let mut annotations = Vec::new();
                if let Some(id) = id {
                    annotations.push(format!("ID:{}", id));
                }
                if volatile {
                    annotations.push("Volatile".to_string());
                }
                if !annotations.is_empty() {
                    line.push_str(&format!(" ; {}", annotations.join(" ")));
                }
                line
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// print(parse(p)) is canonical and parse(print(parse(p))) = parse(p)
        /// for any well-formed payload.
        #[test]
        fn prop_payload_round_trip(lines in proptest::collection::vec(line_strategy(), 0..6)) {
            let payload = lines.join("\n");
            let set: DynamicRecordSet = payload.parse().unwrap();
            let printed = set.to_string();
            let reparsed: DynamicRecordSet = printed.parse().unwrap();
            prop_assert_eq!(&reparsed, &set);
            prop_assert_eq!(reparsed.to_string(), printed);
        }
    }
}
