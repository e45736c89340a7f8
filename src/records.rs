//! Comma-separated records as written by spreadsheet tools and by the
//! manifest: quoted fields may hold commas, doubled quotes and line breaks.

/// Quotes `field` when it would otherwise split or break a record.
pub fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn push_record(records: &mut Vec<Vec<String>>, fields: Vec<String>) {
    if fields.iter().any(|f| !f.trim().is_empty()) {
        records.push(fields);
    }
}

/// Splits `text` into records of fields. Blank lines are dropped and a
/// leading byte-order mark is ignored.
pub fn parse_records(text: &str) -> Vec<Vec<String>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    cur.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if cur.is_empty() => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut cur)),
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if !in_quotes => {
                fields.push(std::mem::take(&mut cur));
                push_record(&mut records, std::mem::take(&mut fields));
            }
            _ => cur.push(ch),
        }
    }
    if !cur.is_empty() || !fields.is_empty() {
        fields.push(cur);
        push_record(&mut records, fields);
    }
    records
}
