use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

/// Failures raised while pulling access records out of a trace.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("unable to open trace file '{}'", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("line {line}: read failed")]
    Read {
        line: u64,
        #[source]
        source: io::Error,
    },
    #[error("line {line}: malformed record: {reason}")]
    MalformedRecord { line: u64, reason: String },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AccessKind {
    Load,
    Store,
}

impl AccessKind {
    pub fn is_store(self) -> bool {
        self == AccessKind::Store
    }
}

/// A single memory access taken from one line of a trace.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct AccessRecord {
    pub kind: AccessKind,
    pub address: u64,
    pub instructions_retired: u64,
}

impl AccessRecord {
    pub fn load(address: u64) -> Self {
        Self {
            kind: AccessKind::Load,
            address,
            instructions_retired: 0,
        }
    }

    pub fn store(address: u64) -> Self {
        Self {
            kind: AccessKind::Store,
            address,
            instructions_retired: 0,
        }
    }
}

impl FromStr for AccessRecord {
    type Err = String;

    /// Parse `<op> <hex address> <decimal instruction count>`. An `op` of `l` is a load and
    /// anything else is a store. The address may carry a `0x` prefix.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.split_whitespace();
        let op = fields.next().ok_or("missing operation field")?;
        let address = fields.next().ok_or("missing address field")?;
        let instructions = fields.next().ok_or("missing instruction count field")?;
        if let Some(extra) = fields.next() {
            return Err(format!("unexpected trailing field '{}'", extra));
        }

        let digits = address
            .strip_prefix("0x")
            .or_else(|| address.strip_prefix("0X"))
            .unwrap_or(address);
        let address = u64::from_str_radix(digits, 16)
            .map_err(|e| format!("address '{}' is not hexadecimal: {}", address, e))?;
        let instructions_retired = instructions
            .parse::<u64>()
            .map_err(|e| format!("instruction count '{}' is not an integer: {}", instructions, e))?;

        Ok(Self {
            kind: if op == "l" {
                AccessKind::Load
            } else {
                AccessKind::Store
            },
            address,
            instructions_retired,
        })
    }
}

/// `TraceReader` sequentially yields access records from a text trace, one record per line.
/// Blank lines are skipped. The reader stops at end of input; any line that cannot be read or
/// parsed is yielded as an error carrying its 1-based line number.
pub struct TraceReader<R = BufReader<File>> {
    reader: R,
    pub line_number: u64,
}

impl TraceReader<BufReader<File>> {
    /// Open the trace at `path`.
    ///
    /// # Errors
    ///
    /// Returns `TraceError::SourceUnavailable` if the file cannot be opened, rather than
    /// treating a missing trace as an empty one.
    pub fn open(path: &Path) -> Result<Self, TraceError> {
        match File::open(path) {
            Err(source) => Err(TraceError::SourceUnavailable {
                path: path.to_path_buf(),
                source,
            }),
            Ok(ptr) => Ok(Self::new(BufReader::new(ptr))),
        }
    }
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
        }
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<AccessRecord, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buffer = String::new();
        loop {
            buffer.clear();
            self.line_number += 1;
            match self.reader.read_line(&mut buffer) {
                Err(source) => {
                    return Some(Err(TraceError::Read {
                        line: self.line_number,
                        source,
                    }))
                }
                Ok(0) => {
                    self.line_number -= 1;
                    return None;
                }
                Ok(_) if buffer.trim().is_empty() => continue,
                Ok(_) => {
                    return Some(buffer.parse::<AccessRecord>().map_err(|reason| {
                        TraceError::MalformedRecord {
                            line: self.line_number,
                            reason,
                        }
                    }))
                }
            }
        }
    }
}
