use std::io::{self, Write};

use serde::Serialize;

use crate::domain::{GenotypeRecord, ResolutionResult};

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_calls(result: &ResolutionResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_records(records: &[GenotypeRecord]) -> io::Result<()> {
        Self::print_json(&records)
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
