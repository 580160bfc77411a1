use std::io::{self, Write};

use serde::Serialize;

use crate::domain::Document;
use crate::summary::DatasetSummary;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_document(document: &Document) -> io::Result<()> {
        Self::print_json(document)
    }

    pub fn print_ids(ids: &[String]) -> io::Result<()> {
        Self::print_json(&ids)
    }

    pub fn print_summary(summary: &DatasetSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
