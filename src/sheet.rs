//! Reading uploaded spreadsheets and producing downloadable ones, as CSV.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};

/// One spreadsheet row, keyed by column header.
pub type Row = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("the file is not valid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("the file has no header row")]
    NoHeaders,
    #[error("could not write the file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sheet {
    /// Column names in file order.
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

/// Tidies a cell the way spreadsheet exports tend to need: `12.0` becomes
/// `12`.
pub fn normalize_cell(value: &str) -> String {
    let value = value.trim();

    if let Some(whole) = value.strip_suffix(".0") {
        if !whole.is_empty() && whole.parse::<f64>().is_ok() {
            return whole.to_string();
        }
    }

    value.to_string()
}

/// Rewrites a cell holding only an ISO date, with or without a time, as
/// `dd/mm/yyyy`. Anything else is returned unchanged.
pub fn normalize_date(value: &str) -> String {
    let value = value.trim();

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.format("%d/%m/%Y").to_string();
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(value, format) {
            return datetime.format("%d/%m/%Y").to_string();
        }
    }

    value.to_string()
}

/// Reads a CSV upload. Cells under `date_columns` also get their ISO dates
/// rewritten.
pub fn read_sheet(bytes: &[u8], date_columns: &[&str]) -> Result<Sheet, SheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(SheetError::NoHeaders);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let row = headers
            .iter()
            .enumerate()
            .filter(|(_, header)| !header.is_empty())
            .map(|(i, header)| {
                let cell = normalize_cell(record.get(i).unwrap_or_default());
                let cell = if date_columns.contains(&header.as_str()) {
                    normalize_date(&cell)
                } else {
                    cell
                };
                (header.clone(), cell)
            })
            .collect();
        rows.push(row);
    }

    Ok(Sheet { headers, rows })
}

pub fn write_sheet<S: AsRef<str>>(
    headers: &[&str],
    rows: &[Vec<S>],
) -> Result<Vec<u8>, SheetError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row.iter().map(|cell| cell.as_ref()))?;
    }
    writer.into_inner().map_err(|e| SheetError::Io(e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_are_normalised() {
        assert_eq!(normalize_cell(" 30.0 "), "30");
        assert_eq!(normalize_cell("2.5"), "2.5");
        assert_eq!(normalize_cell("version 1.0"), "version 1.0");
        assert_eq!(normalize_cell("2025-03-01"), "2025-03-01");
    }

    #[test]
    fn whole_cell_dates_are_rewritten() {
        assert_eq!(normalize_date("2025-03-01"), "01/03/2025");
        assert_eq!(normalize_date("2025-03-01 00:00:00"), "01/03/2025");
        assert_eq!(normalize_date("2025-03-01T08:15:00"), "01/03/2025");
        assert_eq!(normalize_date("01/03/2025"), "01/03/2025");
        assert_eq!(normalize_date("2025-03-01 launch"), "2025-03-01 launch");
    }

    #[test]
    fn dates_only_change_in_date_columns() {
        let csv = "texto,tipo,data_liberacao\n\
                   2025-03-01 was the launch day. True?,verdadeiro_falso,2025-03-01\n";
        let sheet = read_sheet(csv.as_bytes(), &["data_liberacao"]).unwrap();

        assert_eq!(sheet.rows[0]["texto"], "2025-03-01 was the launch day. True?");
        assert_eq!(sheet.rows[0]["data_liberacao"], "01/03/2025");
    }

    #[test]
    fn reads_rows_by_header() {
        let csv = "\u{feff}texto,tipo,tempo_limite\n\
                   Capital of France?,multipla_escolha,30.0\n\
                   ,,\n\
                   Explain churn,discursiva,\n";
        let sheet = read_sheet(csv.as_bytes(), &[]).unwrap();

        assert_eq!(sheet.headers, vec!["texto", "tipo", "tempo_limite"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0]["tempo_limite"], "30");
        assert_eq!(sheet.rows[1]["tipo"], "discursiva");
        assert_eq!(sheet.rows[1]["tempo_limite"], "");
    }

    #[test]
    fn short_rows_are_padded() {
        let sheet = read_sheet(b"a,b,c\n1\n", &[]).unwrap();
        assert_eq!(sheet.rows[0]["c"], "");
    }

    #[test]
    fn writes_csv() {
        let bytes = write_sheet(
            &["Name", "Score"],
            &[vec!["Ana, the first", "10"], vec!["Bruno", "0"]],
        )
        .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "Name,Score\n\"Ana, the first\",10\nBruno,0\n");
    }
}
