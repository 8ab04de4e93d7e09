use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::debug;
use tokio::process::{Child, Command as TokioCommand};

use crate::process::{ProcessError, ProcessResult};

/// The command line of a solver or utility
///
/// Output of the spawned process arrives as one stream: stderr is redirected
/// into stdout inside the child, so lines keep the order the program wrote
/// them in.
#[derive(Debug, Clone, PartialEq)]
pub struct FoamCommand {
    /// Program to execute
    program: String,

    /// Arguments to pass to the program
    args: Vec<String>,

    /// Current working directory
    current_dir: Option<PathBuf>,

    /// Environment variables
    env_vars: HashMap<String, String>,
}

impl FoamCommand {
    /// Create a new command
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env_vars: HashMap::new(),
        }
    }

    /// Create a command from a full argument vector
    pub fn from_argv<I, S>(argv: I) -> ProcessResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv.next().ok_or_else(|| ProcessError::Spawn {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command line"),
        })?;
        Ok(Self::new(program).args(argv))
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the current working directory
    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add an environment variable
    pub fn env<K, V>(mut self, key: K, val: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars.insert(key.into(), val.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Program and arguments as one vector
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// The command line joined with spaces
    pub fn command_line(&self) -> String {
        self.argv().join(" ")
    }

    /// Spawn the command with stderr merged into a piped stdout
    pub fn spawn(&self) -> ProcessResult<Child> {
        debug!("Spawning command: {} {:?}", self.program, self.args);

        // The shell would only report a missing program through its exit code
        let resolved = match &self.current_dir {
            Some(dir) => which::which_in(&self.program, std::env::var_os("PATH"), dir),
            None => which::which(&self.program),
        };
        if let Err(e) = resolved {
            return Err(ProcessError::Spawn {
                program: self.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()),
            });
        }

        // `$0` is the program, `"$@"` its arguments; exec keeps the pid
        let mut cmd = TokioCommand::new("sh");
        cmd.arg("-c")
            .arg("exec \"$0\" \"$@\" 2>&1")
            .arg(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        for (key, val) in &self.env_vars {
            cmd.env(key, val);
        }

        cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: self.program.clone(),
            source,
        })
    }
}
