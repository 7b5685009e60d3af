//! Flat log of the commands that touched the kubeconfig, one
//! `<index>  <command-line>` per line.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub index: u64,
    pub line: String,
}

impl Record {
    pub fn parse(line: &str) -> Result<Record> {
        let index = line
            .split_whitespace()
            .next()
            .and_then(|token| token.parse().ok())
            .ok_or_else(|| Error::History {
                line: line.to_string(),
            })?;

        Ok(Record {
            index,
            line: line.to_string(),
        })
    }
}

pub struct History {
    path: PathBuf,
}

impl History {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records in file order; a missing file is an empty history.
    pub fn records(&self) -> Result<Vec<Record>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::io(&self.path, err)),
        };

        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(Record::parse)
            .collect()
    }

    /// Append `command` under the next index.
    pub fn append(&self, command: &str) -> Result<Record> {
        let mut records = self.records()?;
        let index = records.iter().map(|r| r.index).max().unwrap_or(0) + 1;
        let record = Record {
            index,
            line: format!("{index}  {command}"),
        };

        records.push(record.clone());
        self.write(&records)?;
        Ok(record)
    }

    /// Drop every record whose index is `from` or later. `from` of zero, or
    /// below the lowest index, empties the log.
    pub fn delete_from(&self, from: u64) -> Result<()> {
        let records = self.records()?;
        let lowest = records.iter().map(|r| r.index).min();
        let highest = records.iter().map(|r| r.index).max();

        match (lowest, highest) {
            (None, _) | (_, None) => Ok(()),
            (Some(lowest), _) if from == 0 || from < lowest => self.write(&[]),
            (_, Some(highest)) if from > highest => Ok(()),
            _ => {
                let kept: Vec<Record> = records.into_iter().filter(|r| r.index < from).collect();
                self.write(&kept)
            }
        }
    }

    fn write(&self, records: &[Record]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
        }

        let mut content = String::new();
        for record in records {
            content.push_str(&record.line);
            content.push('\n');
        }
        fs::write(&self.path, content).map_err(|err| Error::io(&self.path, err))
    }
}
