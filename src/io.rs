//! The machine's external collaborators: where `IN` values come from and
//! where reports and state snapshots go.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use log::warn;

use crate::memory::Int;
use crate::processor::Snapshot;

/// Supplies one integer per `IN` instruction.
pub trait Input {
    /// Blocks until a value is available.
    fn read_value(&mut self) -> io::Result<Int>;
}

/// Consumes instruction reports and per-line state snapshots.
pub trait Sink {
    /// One human-readable line about the instruction just executed.
    fn note(&mut self, message: &str);

    /// The full machine state after a processed line.
    fn snapshot(&mut self, snapshot: &Snapshot<'_>);
}

/// Interactive console: values from stdin, everything else to stdout.
#[derive(Debug, Default)]
pub struct StdConsole;

impl Input for StdConsole {
    fn read_value(&mut self) -> io::Result<Int> {
        print!("Enter a value: ");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        let line = line.trim();
        line.parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("`{}` is not an integer", line),
            )
        })
    }
}

impl Sink for StdConsole {
    fn note(&mut self, message: &str) {
        println!("{}", message);
    }

    fn snapshot(&mut self, snapshot: &Snapshot<'_>) {
        println!("{}", snapshot);
    }
}

/// Mirrors everything shown through the inner sink into a log file.
pub struct Logged<S> {
    inner: S,
    file: File,
}

impl<S> Logged<S> {
    pub fn create<P: AsRef<Path>>(inner: S, path: P) -> io::Result<Self> {
        Ok(Self {
            inner,
            file: File::create(path)?,
        })
    }

    fn log(&mut self, text: &dyn std::fmt::Display) {
        if let Err(err) = writeln!(self.file, "{}", text) {
            warn!("log write failed: {}", err);
        }
    }
}

impl<S: Input> Input for Logged<S> {
    fn read_value(&mut self) -> io::Result<Int> {
        self.inner.read_value()
    }
}

impl<S: Sink> Sink for Logged<S> {
    fn note(&mut self, message: &str) {
        self.log(&message);
        self.inner.note(message);
    }

    fn snapshot(&mut self, snapshot: &Snapshot<'_>) {
        self.log(snapshot);
        self.inner.snapshot(snapshot);
    }
}

/// Scripted collaborator for tests: queued input values, captured output.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    pub values: VecDeque<Int>,
    pub notes: Vec<String>,
    pub snapshots: Vec<String>,
}

impl ScriptedConsole {
    pub fn with_values(values: &[Int]) -> Self {
        Self {
            values: values.iter().copied().collect(),
            ..Self::default()
        }
    }
}

impl Input for ScriptedConsole {
    fn read_value(&mut self) -> io::Result<Int> {
        self.values.pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted value left")
        })
    }
}

impl Sink for ScriptedConsole {
    fn note(&mut self, message: &str) {
        self.notes.push(message.to_string());
    }

    fn snapshot(&mut self, snapshot: &Snapshot<'_>) {
        self.snapshots.push(snapshot.to_string());
    }
}
