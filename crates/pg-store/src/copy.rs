//! Rendering rows into the Postgres COPY text format: tab-separated fields,
//! `\N` as the null sentinel, control characters escaped.

use chrono::NaiveDate;

#[derive(Debug, Default)]
pub struct CopyBuffer {
    data: String,
    fields_in_row: usize,
}

impl CopyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.fields_in_row == 0
    }

    fn separator(&mut self) {
        if self.fields_in_row > 0 {
            self.data.push('\t');
        }
        self.fields_in_row += 1;
    }

    pub fn push_str(&mut self, value: &str) {
        self.separator();
        for ch in value.chars() {
            match ch {
                '\t' => self.data.push_str("\\t"),
                '\n' => self.data.push_str("\\n"),
                '\r' => self.data.push_str("\\r"),
                '\\' => self.data.push_str("\\\\"),
                other => self.data.push(other),
            }
        }
    }

    pub fn push_opt_str(&mut self, value: Option<&str>) {
        match value {
            Some(v) => self.push_str(v),
            None => self.push_null(),
        }
    }

    pub fn push_null(&mut self) {
        self.separator();
        self.data.push_str("\\N");
    }

    pub fn push_f64(&mut self, value: f64) {
        self.separator();
        self.data.push_str(&value.to_string());
    }

    pub fn push_opt_f64(&mut self, value: Option<f64>) {
        match value {
            Some(v) => self.push_f64(v),
            None => self.push_null(),
        }
    }

    pub fn push_i64(&mut self, value: i64) {
        self.separator();
        self.data.push_str(&value.to_string());
    }

    pub fn push_opt_i64(&mut self, value: Option<i64>) {
        match value {
            Some(v) => self.push_i64(v),
            None => self.push_null(),
        }
    }

    pub fn push_bool(&mut self, value: bool) {
        self.separator();
        self.data.push_str(if value { "true" } else { "false" });
    }

    pub fn push_opt_bool(&mut self, value: Option<bool>) {
        match value {
            Some(v) => self.push_bool(v),
            None => self.push_null(),
        }
    }

    pub fn push_date(&mut self, value: NaiveDate) {
        self.separator();
        self.data.push_str(&value.format("%Y-%m-%d").to_string());
    }

    pub fn push_opt_date(&mut self, value: Option<NaiveDate>) {
        match value {
            Some(v) => self.push_date(v),
            None => self.push_null(),
        }
    }

    pub fn end_row(&mut self) {
        self.data.push('\n');
        self.fields_in_row = 0;
    }

    pub fn rows(&self) -> usize {
        self.data.matches('\n').count()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_tab_separated_rows_with_null_sentinel() {
        let mut buf = CopyBuffer::new();
        buf.push_date(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        buf.push_str("AAPL");
        buf.push_opt_str(None);
        buf.push_f64(191.04);
        buf.end_row();

        let text = String::from_utf8(buf.into_bytes()).unwrap();
        assert_eq!(text, "2024-05-10\tAAPL\t\\N\t191.04\n");
    }

    #[test]
    fn escapes_control_characters_in_strings() {
        let mut buf = CopyBuffer::new();
        buf.push_str("Acme\tCorp\nLine\r\\x");
        buf.end_row();

        let text = String::from_utf8(buf.into_bytes()).unwrap();
        assert_eq!(text, "Acme\\tCorp\\nLine\\r\\\\x\n");
    }

    #[test]
    fn counts_rows() {
        let mut buf = CopyBuffer::new();
        assert!(buf.is_empty());
        buf.push_i64(1);
        buf.end_row();
        buf.push_i64(2);
        buf.end_row();
        assert_eq!(buf.rows(), 2);
    }
}
