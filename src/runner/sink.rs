use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Receives every line of a run after it has been checked
///
/// An error of kind `BrokenPipe` interrupts the run; other errors are
/// logged and the sink stays registered.
pub trait LineSink: Send {
    fn line(&mut self, line: &str) -> io::Result<()>;

    /// The simulation time changed
    fn time_changed(&mut self, time: f64) -> io::Result<()> {
        let _ = time;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Echoes the solver output on stdout
#[derive(Debug, Default)]
pub struct StdoutEcho;

impl LineSink for StdoutEcho {
    fn line(&mut self, line: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", line)
    }

    fn close(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// Prints only the simulation time instead of the output
///
/// The short form overwrites one line, the long form prints one line per
/// time step.
#[derive(Debug, Default)]
pub struct Progress {
    long: bool,
    printed: bool,
}

impl Progress {
    pub fn new(long: bool) -> Self {
        Self { long, printed: false }
    }
}

impl LineSink for Progress {
    fn line(&mut self, _line: &str) -> io::Result<()> {
        Ok(())
    }

    fn time_changed(&mut self, time: f64) -> io::Result<()> {
        let mut out = io::stdout().lock();
        if self.long {
            writeln!(out, "t = {:>12}", time)?;
        } else {
            write!(out, "\rt = {:>12}", time)?;
            out.flush()?;
        }
        self.printed = true;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if self.printed && !self.long {
            writeln!(io::stdout())?;
        }
        Ok(())
    }
}

/// Keeps all lines in memory, shared with whoever holds a clone
#[derive(Debug, Clone, Default)]
pub struct Collect {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Collect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines received so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl LineSink for Collect {
    fn line(&mut self, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .map_err(|_| io::Error::other("collector lock poisoned"))?
            .push(line.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_shares_lines() {
        let collect = Collect::new();
        let mut sink: Box<dyn LineSink> = Box::new(collect.clone());
        sink.line("Time = 1").unwrap();
        sink.time_changed(1.0).unwrap();
        sink.line("End").unwrap();
        sink.close().unwrap();
        assert_eq!(collect.lines(), vec!["Time = 1", "End"]);
    }
}
