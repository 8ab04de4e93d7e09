//! Running solvers in parallel through an MPI launcher

use log::{debug, warn};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::MpiSettings;
use crate::error::{FoamError, Result};

/// Environment variable holding the installation prefix of the MPI library
pub const MPI_ARCH_PATH: &str = "MPI_ARCH_PATH";

fn read_machine_file(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .map_err(|e| FoamError::MachineFile(format!("{}: {}", path.display(), e)))?;

    let mut hosts = Vec::new();
    for line in text.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] => {}
            [host] => hosts.push(host.to_string()),
            _ => {
                return Err(FoamError::MachineFile(format!(
                    "{}: more than one element in line '{}', write one host per line and \
                     repeat hosts with several CPUs",
                    path.display(),
                    line.trim()
                )));
            }
        }
    }
    Ok(hosts)
}

/// Decorates command lines for a parallel run
///
/// Only OpenMPI style launchers are supported.
#[derive(Debug, Clone)]
pub struct MpiLauncher {
    machine_file: Option<PathBuf>,
    hosts: Vec<String>,
    nr_procs: Option<usize>,
    settings: MpiSettings,
}

impl MpiLauncher {
    /// Check the setup of a parallel run
    ///
    /// Either a machine file or a number of processes is needed, and the
    /// launcher must be on the `PATH`.
    pub fn new(machine_file: Option<PathBuf>, nr_procs: Option<usize>, settings: &MpiSettings) -> Result<Self> {
        if !settings.implementation.to_uppercase().contains("OPENMPI") {
            return Err(FoamError::Parallel(format!(
                "Unknown or unsupported MPI implementation: {}",
                settings.implementation
            )));
        }

        let machine_file = machine_file.filter(|p| !p.as_os_str().is_empty());
        if machine_file.is_none() && nr_procs.is_none() {
            return Err(FoamError::Parallel(format!(
                "Either a machine file or the number of processes must be given for {}",
                settings.implementation
            )));
        }

        let hosts = match machine_file.as_deref() {
            Some(path) => read_machine_file(path)?,
            None => Vec::new(),
        };

        which::which(&settings.run).map_err(|_| FoamError::LauncherNotFound(settings.run.clone()))?;

        Ok(Self {
            machine_file,
            hosts,
            nr_procs,
            settings: settings.clone(),
        })
    }

    /// Number of processes the run uses
    pub fn cpu_nr(&self) -> usize {
        match (&self.machine_file, self.nr_procs) {
            (Some(_), Some(nr)) => self.hosts.len().min(nr),
            (Some(_), None) => self.hosts.len(),
            (None, Some(nr)) => nr,
            (None, None) => 0,
        }
    }

    pub fn machine_file(&self) -> Option<&Path> {
        self.machine_file.as_deref()
    }

    /// The command line that runs `argv` in parallel
    pub fn build_mpirun(&self, argv: &[String]) -> Vec<String> {
        let mut mpirun = vec![self.settings.run.clone()];
        mpirun.extend(self.settings.options_pre.iter().cloned());

        if let Some(file) = &self.machine_file {
            mpirun.push("--machinefile".to_string());
            mpirun.push(file.display().to_string());
        }
        if self.settings.add_prefix {
            match env::var(MPI_ARCH_PATH) {
                Ok(prefix) => {
                    mpirun.push("--prefix".to_string());
                    mpirun.push(prefix);
                }
                Err(_) => warn!("{} is not set, no --prefix passed", MPI_ARCH_PATH),
            }
        }
        if let Some(nr) = self.nr_procs {
            mpirun.push("--n".to_string());
            mpirun.push(nr.to_string());
        }
        mpirun.extend(self.settings.options_post.iter().cloned());

        if let Some(program) = argv.first() {
            if which::which(program).is_err() {
                warn!("Can not find {} on the PATH, hoping for the best", program);
            }
        }
        mpirun.extend(argv.iter().cloned());
        mpirun.push("-parallel".to_string());

        debug!("MPI command line: {}", mpirun.join(" "));
        mpirun
    }

    /// Write a decomposeParDict for the metis method
    pub fn write_metis(&self, case_dir: impl AsRef<Path>) -> Result<()> {
        self.write_decomposition(case_dir.as_ref(), "method metis;\n")
    }

    /// Write a decomposeParDict splitting the mesh along one axis (0, 1 or 2)
    pub fn write_simple(&self, case_dir: impl AsRef<Path>, direction: usize) -> Result<()> {
        if direction > 2 {
            return Err(FoamError::Parallel(format!("Invalid direction {}", direction)));
        }
        let n: Vec<String> = (0..3)
            .map(|i| (if i == direction { self.cpu_nr() } else { 1 }).to_string())
            .collect();
        let params = format!(
            "method simple;\n\nsimpleCoeffs\n{{\n\t n \t ({});\n\t delta \t 0.001;\n}}\n",
            n.join(" ")
        );
        self.write_decomposition(case_dir.as_ref(), &params)
    }

    fn write_decomposition(&self, case_dir: &Path, params: &str) -> Result<()> {
        let path = case_dir.join("system").join("decomposeParDict");
        let text = format!(
            "FoamFile\n{{\n    version     2.0;\n    format      ascii;\n    class       dictionary;\n    \
             object      decomposeParDict;\n}}\n// * * * * * * * * * //\n\nnumberOfSubdomains {};\n\n{}\n\n// * * * * * * * * * //",
            self.cpu_nr(),
            params
        );
        fs::write(&path, text)?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}
