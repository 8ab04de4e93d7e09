use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::state::asctime;
use crate::analysis::DataSnapshot;
use crate::process::ResourceUsage;

/// Remark recorded when the caller gave none
pub const DEFAULT_REMARK: &str = "No remark given";

/// Everything recorded about one run
///
/// Written as `startData.json` and `data.json` for analyzed runs and
/// returned by the supervisor when the run is over.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunData {
    pub unique_id: String,
    pub logfile: String,
    pub casefullname: String,
    pub casename: String,
    pub solver: String,
    pub solver_full: String,
    pub command_line: String,
    pub hostname: String,
    pub remark: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub parameters: BTreeMap<String, String>,
    pub starttime: String,

    pub lines: usize,
    pub time: Option<f64>,
    pub step_nr: usize,
    pub lasttimesteptime: Option<String>,
    pub create_time: Option<f64>,

    pub warnings: usize,
    pub warning_text: Option<String>,
    pub error_text: Option<String>,
    pub fatal_error: bool,
    #[serde(rename = "fatalFPE")]
    pub fatal_fpe: bool,
    pub fatal_stackdump: bool,

    pub end_seen: bool,
    pub keyboard_interrupt: bool,
    pub interrupted: bool,
    #[serde(rename = "OK")]
    pub ok: bool,

    pub cpu_time: f64,
    pub cpu_user_time: f64,
    pub cpu_system_time: f64,
    pub wall_time: f64,
    /// Peak memory in MB
    pub used_memory: f64,
    pub return_code: Option<i32>,
    pub endtime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzed: Option<BTreeMap<String, DataSnapshot>>,
}

impl RunData {
    /// Data of a run that has not started yet
    pub fn new(argv: &[String]) -> Self {
        let solver_full = argv.first().cloned().unwrap_or_default();
        let solver = std::path::Path::new(&solver_full)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| solver_full.clone());

        Self {
            unique_id: Uuid::new_v4().to_string(),
            logfile: String::new(),
            casefullname: String::new(),
            casename: String::new(),
            solver,
            solver_full,
            command_line: argv.join(" "),
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_default(),
            remark: DEFAULT_REMARK.to_string(),
            job_id: None,
            parameters: BTreeMap::new(),
            starttime: asctime(),
            lines: 0,
            time: None,
            step_nr: 0,
            lasttimesteptime: None,
            create_time: None,
            warnings: 0,
            warning_text: None,
            error_text: None,
            fatal_error: false,
            fatal_fpe: false,
            fatal_stackdump: false,
            end_seen: false,
            keyboard_interrupt: false,
            interrupted: false,
            ok: false,
            cpu_time: 0.0,
            cpu_user_time: 0.0,
            cpu_system_time: 0.0,
            wall_time: 0.0,
            used_memory: 0.0,
            return_code: None,
            endtime: None,
            analyzed: None,
        }
    }

    /// Copy the resource usage of the finished process
    pub fn set_usage(&mut self, usage: &ResourceUsage) {
        self.cpu_user_time = usage.user_time;
        self.cpu_system_time = usage.system_time;
        self.cpu_time = usage.cpu_time();
        self.wall_time = usage.wall_time;
        self.used_memory = usage.used_memory();
    }

    /// No fatal error, floating point exception or stack dump was seen
    pub fn is_clean(&self) -> bool {
        !(self.fatal_error || self.fatal_fpe || self.fatal_stackdump)
    }
}
