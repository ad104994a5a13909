use std::io::Read;

use serde::{Deserialize, Deserializer};

use crate::workflows::admission::domain::Gender;

/// One cleaned roster row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub name: String,
    pub gender: Option<Gender>,
    pub marks: Option<u16>,
    pub index_no: Option<String>,
    pub birth_certificate_no: Option<String>,
}

/// A row the parser could not turn into an entry, with its 1-based line.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RosterProblem {
    pub line: usize,
    pub detail: String,
}

pub(crate) fn parse_rows<R: Read>(
    reader: R,
) -> Result<(Vec<RosterEntry>, Vec<RosterProblem>), csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut entries = Vec::new();
    let mut problems = Vec::new();

    for (offset, record) in csv_reader.deserialize::<RosterRow>().enumerate() {
        // Header occupies line 1.
        let line = offset + 2;
        let row = record?;

        let name = normalize_name(&row.name);
        if name.is_empty() {
            problems.push(RosterProblem {
                line,
                detail: "row has no learner name".to_string(),
            });
            continue;
        }

        if row.index_no.is_none() && row.birth_certificate_no.is_none() {
            problems.push(RosterProblem {
                line,
                detail: format!("'{name}' has neither an index number nor a birth certificate"),
            });
            continue;
        }

        let marks = match row.marks.as_deref() {
            None => None,
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) => Some(value),
                Err(_) => {
                    problems.push(RosterProblem {
                        line,
                        detail: format!("'{name}' has an unreadable marks total '{raw}'"),
                    });
                    None
                }
            },
        };

        entries.push(RosterEntry {
            name,
            gender: row.gender.as_deref().and_then(Gender::parse),
            marks,
            index_no: row.index_no,
            birth_certificate_no: row.birth_certificate_no,
        });
    }

    Ok((entries, problems))
}

/// Strip a byte-order mark and collapse runs of whitespace.
pub(crate) fn normalize_name(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Deserialize)]
struct RosterRow {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Gender", default, deserialize_with = "empty_string_as_none")]
    gender: Option<String>,
    #[serde(rename = "Marks", default, deserialize_with = "empty_string_as_none")]
    marks: Option<String>,
    #[serde(
        rename = "Index Number",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    index_no: Option<String>,
    #[serde(
        rename = "Birth Certificate No",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    birth_certificate_no: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
