//! Term dictionary loading.
//!
//! The dictionary is a `;`-delimited UTF-8 file with a header row. Columns are
//! found by name, in Portuguese or English:
//!
//! | column | aliases | default |
//! |---|---|---|
//! | keyword | `palavra_chave`, `keyword`, `term` | required |
//! | axis | `eixo_temat`, `eixo`, `axis` | `Geral` |
//! | interest weight | `peso_interesse`, `interest_weight` | `1` |
//! | risk weight | `peso_risco`, `risk_weight` | `1` |
//! | match type | `tipo`, `match_type`, `type` | `word` |

use std::path::Path;

use tracing::{debug, warn};

use clipping_shared::{ClippingError, Result};

/// Axis assigned to terms whose axis column is missing or blank.
pub const DEFAULT_AXIS: &str = "Geral";

const DELIMITER: char = ';';

/// How a term is matched against normalized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Whole-word match with word boundaries on both sides.
    Word,
    /// Exact substring match.
    Phrase,
}

impl MatchType {
    fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "" | "word" | "palavra" => Some(Self::Word),
            "phrase" | "expressão" | "expressao" => Some(Self::Phrase),
            _ => None,
        }
    }
}

/// One row of the dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryTerm {
    /// The keyword, lower-cased (accents kept).
    pub term: String,
    pub axis: String,
    pub interest_weight: f64,
    pub risk_weight: f64,
    pub match_type: MatchType,
}

/// Ordered list of terms. Order matters: it decides the axis tie-break and
/// which matches survive detail truncation.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    terms: Vec<DictionaryTerm>,
}

/// Column positions resolved from the header row.
struct Columns {
    keyword: usize,
    axis: Option<usize>,
    interest: Option<usize>,
    risk: Option<usize>,
    kind: Option<usize>,
}

impl Columns {
    fn from_header(header: &str) -> Result<Self> {
        let names: Vec<String> = split_row(header)
            .into_iter()
            .map(|h| h.trim().to_lowercase())
            .collect();
        let find = |aliases: &[&str]| names.iter().position(|n| aliases.contains(&n.as_str()));

        let keyword = find(&["palavra_chave", "keyword", "term"]).ok_or_else(|| {
            ClippingError::Dictionary(format!(
                "header has no keyword column (found: {})",
                names.join(", ")
            ))
        })?;

        Ok(Self {
            keyword,
            axis: find(&["eixo_temat", "eixo", "axis"]),
            interest: find(&["peso_interesse", "interest_weight"]),
            risk: find(&["peso_risco", "risk_weight"]),
            kind: find(&["tipo", "match_type", "type"]),
        })
    }
}

impl Dictionary {
    /// Build a dictionary from already-typed terms.
    pub fn from_terms(terms: Vec<DictionaryTerm>) -> Self {
        Self { terms }
    }

    /// Load and parse a dictionary file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ClippingError::io(path, e))?;
        let dictionary = Self::parse(&content)?;
        debug!(path = %path.display(), terms = dictionary.len(), "dictionary loaded");
        Ok(dictionary)
    }

    /// Parse dictionary text. Rows that cannot be read are skipped with a warning.
    pub fn parse(content: &str) -> Result<Self> {
        let content = content.trim_start_matches('\u{feff}');
        let mut lines = content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

        let (_, header) = lines
            .next()
            .ok_or_else(|| ClippingError::Dictionary("dictionary file is empty".into()))?;
        let columns = Columns::from_header(header)?;

        let mut terms = Vec::new();
        for (index, line) in lines {
            match parse_row(line, &columns) {
                Ok(Some(term)) => terms.push(term),
                Ok(None) => {}
                Err(reason) => warn!(line = index + 1, %reason, "skipping dictionary row"),
            }
        }

        Ok(Self { terms })
    }

    pub fn terms(&self) -> &[DictionaryTerm] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

fn parse_row(line: &str, columns: &Columns) -> std::result::Result<Option<DictionaryTerm>, String> {
    let fields = split_row(line);
    let field = |idx: Option<usize>| {
        idx.and_then(|i| fields.get(i))
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
    };

    let Some(keyword) = field(Some(columns.keyword)) else {
        return Ok(None);
    };

    let weight = |idx: Option<usize>, name: &str| match field(idx) {
        Some(raw) => raw
            .replace(',', ".")
            .parse::<f64>()
            .ok()
            .filter(|w| w.is_finite())
            .ok_or_else(|| format!("{name} '{raw}' is not a number")),
        None => Ok(1.0),
    };

    let match_type = match field(columns.kind) {
        Some(label) => MatchType::from_label(label).unwrap_or_else(|| {
            debug!(label, keyword, "unknown match type, treating as word");
            MatchType::Word
        }),
        None => MatchType::Word,
    };

    Ok(Some(DictionaryTerm {
        term: keyword.to_lowercase(),
        axis: field(columns.axis).unwrap_or(DEFAULT_AXIS).to_string(),
        interest_weight: weight(columns.interest, "interest weight")?,
        risk_weight: weight(columns.risk, "risk weight")?,
        match_type,
    }))
}

/// Split a row on the delimiter, honouring double-quoted fields.
fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            DELIMITER if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_portuguese_header() {
        let dict = Dictionary::parse(
            "palavra_chave;eixo_temat;peso_interesse;peso_risco;tipo\n\
             Reforma Tributária;Economia;3;2;expressão\n\
             imposto;Economia;2,5;1;palavra\n",
        )
        .unwrap();

        assert_eq!(dict.len(), 2);
        let first = &dict.terms()[0];
        assert_eq!(first.term, "reforma tributária");
        assert_eq!(first.match_type, MatchType::Phrase);
        assert_eq!(dict.terms()[1].interest_weight, 2.5);
    }

    #[test]
    fn english_header_in_any_order() {
        let dict = Dictionary::parse(
            "match_type;keyword;axis;risk_weight;interest_weight\n\
             phrase;saúde pública;Saúde;0;4\n",
        )
        .unwrap();
        let term = &dict.terms()[0];
        assert_eq!(term.axis, "Saúde");
        assert_eq!(term.interest_weight, 4.0);
        assert_eq!(term.risk_weight, 0.0);
        assert_eq!(term.match_type, MatchType::Phrase);
    }

    #[test]
    fn missing_optional_columns_use_defaults() {
        let dict = Dictionary::parse("palavra_chave\nlicitação\n").unwrap();
        let term = &dict.terms()[0];
        assert_eq!(term.axis, DEFAULT_AXIS);
        assert_eq!(term.interest_weight, 1.0);
        assert_eq!(term.risk_weight, 1.0);
        assert_eq!(term.match_type, MatchType::Word);
    }

    #[test]
    fn bad_rows_are_skipped() {
        let dict = Dictionary::parse(
            "palavra_chave;eixo_temat;peso_interesse\n\
             ;Economia;2\n\
             tributo;Economia;alto\n\
             emprego;Trabalho;2\n",
        )
        .unwrap();
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.terms()[0].term, "emprego");
    }

    #[test]
    fn header_without_keyword_is_an_error() {
        let err = Dictionary::parse("eixo;peso\nEconomia;1\n").unwrap_err();
        assert!(matches!(err, ClippingError::Dictionary(_)));
        assert!(Dictionary::parse("").is_err());
    }

    #[test]
    fn quoted_fields_may_contain_delimiter() {
        let fields = split_row(r#""a;b";"say ""hi""";c"#);
        assert_eq!(fields, vec!["a;b", r#"say "hi""#, "c"]);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Dictionary::load(Path::new("/nonexistent/dicionario.csv")).unwrap_err();
        assert!(matches!(err, ClippingError::Io { .. }));
    }
}
