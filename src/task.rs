// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Running MIRIAD programs.

use std::{
    collections::BTreeMap,
    fmt::Display,
    path::{Path, PathBuf},
    io::Write,
    process::{Command, Output, Stdio},
    thread,
};

use itertools::Itertools;
use log::{debug, info};
use thiserror::Error;

/// Variables passed through to MIRIAD programs unchanged. Everything
/// starting with "MIR" or "PGPLOT" is passed too.
const COPYLIST: [&str; 12] = [
    "DISPLAY", "EDITOR", "HOME", "LANG", "LOGNAME", "PAGER", "PATH", "SHELL", "TERM", "UID",
    "USER", "VISUAL",
];

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("couldn't launch {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed (exit code {code:?}): {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Where MIRIAD programs live and the environment they run in.
#[derive(Debug, Clone, Default)]
pub struct MiriadEnv {
    vars: BTreeMap<String, String>,
}

impl MiriadEnv {
    /// Build the child environment from this process's environment.
    pub fn from_env() -> MiriadEnv {
        MiriadEnv::from_vars(std::env::vars())
    }

    /// Build the child environment from the given variables, keeping the
    /// ones MIRIAD programs use.
    pub fn from_vars<I, K, V>(vars: I) -> MiriadEnv
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| {
                COPYLIST.contains(&k.as_str()) || k.starts_with("MIR") || k.starts_with("PGPLOT")
            })
            .collect();
        MiriadEnv { vars }
    }

    /// Use the programs in `bindir`.
    pub fn with_bindir<P: AsRef<Path>>(mut self, bindir: P) -> MiriadEnv {
        self.vars
            .insert("MIRBIN".to_string(), bindir.as_ref().display().to_string());
        self
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// The program to run for task `name`: under `MIRBIN` if that is set,
    /// otherwise looked up in `PATH`.
    pub fn bin_path(&self, name: &str) -> PathBuf {
        match self.vars.get("MIRBIN") {
            Some(bindir) if !bindir.is_empty() => Path::new(bindir).join(name),
            _ => PathBuf::from(name),
        }
    }
}

/// A MIRIAD task invocation, built up with keyword parameters and options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    name: String,
    params: Vec<(String, String)>,
    /// Option names with any values that follow them.
    options: Vec<(String, Vec<String>)>,
}

impl Task {
    pub fn new(name: &str) -> Task {
        Task {
            name: name.to_string(),
            params: vec![],
            options: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set a keyword. A trailing underscore is dropped, so keywords that
    /// are Rust keywords can be written `in_`. Setting a keyword again
    /// replaces its value.
    pub fn param<V: Display>(self, key: &str, value: V) -> Task {
        self.set(key, value.to_string())
    }

    /// Set a keyword to a comma-separated list.
    pub fn param_list<I>(self, key: &str, values: I) -> Task
    where
        I: IntoIterator,
        I::Item: Display,
    {
        let joined = values.into_iter().join(",");
        self.set(key, joined)
    }

    fn set(mut self, key: &str, value: String) -> Task {
        let key = key.strip_suffix('_').unwrap_or(key).to_string();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.params.push((key, value)),
        }
        self
    }

    pub fn option(self, name: &str) -> Task {
        self.option_values(name, std::iter::empty::<&str>())
    }

    /// An option taking a value, written `options=name,value`.
    pub fn option_value<V: Display>(self, name: &str, value: V) -> Task {
        self.option_values(name, [value])
    }

    /// An option followed by several values, written
    /// `options=name,v1,v2`. Setting an option again replaces its values.
    pub fn option_values<I>(mut self, name: &str, values: I) -> Task
    where
        I: IntoIterator,
        I::Item: Display,
    {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        match self.options.iter_mut().find(|(o, _)| o == name) {
            Some(entry) => entry.1 = values,
            None => self.options.push((name.to_string(), values)),
        }
        self
    }

    /// The arguments after the program name: options first, then
    /// `key=value` in the order they were set.
    fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.params.len() + 1);
        if !self.options.is_empty() {
            let options = self
                .options
                .iter()
                .flat_map(|(name, values)| std::iter::once(name).chain(values))
                .join(",");
            args.push(format!("options={options}"));
        }
        args.extend(self.params.iter().map(|(k, v)| format!("{k}={v}")));
        args
    }

    /// The task name followed by its arguments.
    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.name.clone())
            .chain(self.args())
            .collect()
    }

    /// Run the program to completion. Its stdin is `input` if given,
    /// otherwise empty so it can't wait on a terminal.
    fn launch(&self, env: &MiriadEnv, input: Option<&str>) -> Result<Output, TaskError> {
        let program = env.bin_path(&self.name);
        let args = self.args();
        let shown = std::iter::once(program.display().to_string())
            .chain(args.iter().cloned())
            .join("' '");
        info!("MIRIAD: '{shown}'");
        let spawn_error = |source: std::io::Error| TaskError::Spawn {
            command: self.name.clone(),
            source,
        };
        let mut child = Command::new(&program)
            .args(&args)
            .env_clear()
            .envs(env.vars())
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        // Feed stdin from another thread while the output pipes drain.
        let writer = match (input, child.stdin.take()) {
            (Some(input), Some(mut stdin)) => {
                let input = input.to_string();
                let name = self.name.clone();
                Some(thread::spawn(move || {
                    // Dropping stdin closes it.
                    if let Err(e) = stdin.write_all(input.as_bytes()) {
                        debug!("{name} stopped reading its input: {e}");
                    }
                }))
            }
            _ => None,
        };
        let output = child.wait_with_output().map_err(spawn_error)?;
        if let Some(writer) = writer {
            if writer.join().is_err() {
                debug!("{}: input writer panicked", self.name);
            }
        }
        Ok(output)
    }

    fn check(&self, output: &Output) -> Result<(), TaskError> {
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!("{} failed; stderr:\n{stderr}", self.name);
        Err(TaskError::Failed {
            command: self.command_line().join(" "),
            code: output.status.code(),
            stderr,
        })
    }

    /// Run the task with no input, failing if it exits unsuccessfully.
    pub fn run(&self, env: &MiriadEnv) -> Result<(), TaskError> {
        let output = self.launch(env, None)?;
        self.check(&output)
    }

    /// Run the task and collect the lines it prints to stdout and stderr.
    pub fn snarf(&self, env: &MiriadEnv) -> Result<(Vec<String>, Vec<String>), TaskError> {
        self.snarf_with_input(env, None)
    }

    /// Like [`Task::snarf`], sending `input` to the task's stdin when given.
    pub fn snarf_with_input(
        &self,
        env: &MiriadEnv,
        input: Option<&str>,
    ) -> Result<(Vec<String>, Vec<String>), TaskError> {
        let output = self.launch(env, input)?;
        self.check(&output)?;
        let lines = |bytes: &[u8]| {
            String::from_utf8_lossy(bytes)
                .lines()
                .map(str::to_string)
                .collect::<Vec<_>>()
        };
        Ok((lines(&output.stdout), lines(&output.stderr)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let task = Task::new("uvaver")
            .param("vis", "in.uv")
            .param("out", "in.uv.avg")
            .param("interval", 10)
            .option("nocal")
            .option("nopass");
        assert_eq!(
            task.command_line(),
            vec![
                "uvaver",
                "options=nocal,nopass",
                "vis=in.uv",
                "out=in.uv.avg",
                "interval=10"
            ]
        );
    }

    #[test]
    fn test_params() {
        let task = Task::new("imstat")
            .param("in_", "image")
            .param_list("region", ["quarter", "box(1,1,10,10)"])
            .param_list("line", [1.5, 2.0])
            .param("in", "other")
            .option("tb")
            .option("tb");
        assert_eq!(
            task.command_line(),
            vec![
                "imstat",
                "options=tb",
                "in=other",
                "region=quarter,box(1,1,10,10)",
                "line=1.5,2"
            ]
        );
        assert_eq!(Task::new("uvlist").command_line(), vec!["uvlist"]);
    }

    #[test]
    fn test_env_copylist() {
        let env = MiriadEnv::from_vars([
            ("HOME", "/home/obs"),
            ("MIRCAT", "/opt/miriad/cat"),
            ("PGPLOT_DIR", "/opt/pgplot"),
            ("LD_LIBRARY_PATH", "/opt/lib"),
            ("SECRET", "x"),
        ]);
        let keys: Vec<&str> = env.vars().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["HOME", "MIRCAT", "PGPLOT_DIR"]);
    }

    #[test]
    fn test_bin_path() {
        let env = MiriadEnv::from_vars(Vec::<(String, String)>::new());
        assert_eq!(env.bin_path("uvcat"), PathBuf::from("uvcat"));
        let env = env.with_bindir("/opt/miriad/bin");
        assert_eq!(env.bin_path("uvcat"), PathBuf::from("/opt/miriad/bin/uvcat"));
    }

    #[test]
    fn test_missing_program() {
        let env = MiriadEnv::default().with_bindir("/nonexistent/miriad/bin");
        let result = Task::new("uvcat").run(&env);
        assert!(matches!(result, Err(TaskError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_and_snarf() {
        let env = MiriadEnv::from_vars([("PATH", "/usr/bin:/bin")]);
        let err = Task::new("false").run(&env).unwrap_err();
        assert!(matches!(err, TaskError::Failed { code: Some(1), .. }));

        let (stdout, stderr) = Task::new("echo").param("vis", "a.uv").snarf(&env).unwrap();
        assert_eq!(stdout, vec!["vis=a.uv"]);
        assert!(stderr.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_snarf_with_input() {
        let env = MiriadEnv::from_vars([("PATH", "/usr/bin:/bin")]);
        let (stdout, _) = Task::new("cat")
            .snarf_with_input(&env, Some("select=ant(1)\nline=chan,4\n"))
            .unwrap();
        assert_eq!(stdout, vec!["select=ant(1)", "line=chan,4"]);

        // Without input, stdin is empty.
        let (stdout, _) = Task::new("cat").snarf_with_input(&env, None).unwrap();
        assert!(stdout.is_empty());

        // A task that ignores its input still finishes.
        let big = "x".repeat(1 << 20);
        let (stdout, _) = Task::new("echo")
            .param("vis", "a.uv")
            .snarf_with_input(&env, Some(&big))
            .unwrap();
        assert_eq!(stdout, vec!["vis=a.uv"]);
    }

    #[test]
    fn test_valued_options() {
        let task = Task::new("uvflag")
            .option("noapply")
            .option_value("sigma", 3.5)
            .option_values("ants", [1, 2, 5])
            .option_value("sigma", 4)
            .param("vis", "a.uv");
        assert_eq!(
            task.command_line(),
            vec!["uvflag", "options=noapply,sigma,4,ants,1,2,5", "vis=a.uv"]
        );
        // Giving a valued option again without values keeps just the name.
        assert_eq!(
            Task::new("x").option_value("a", 1).option("a").command_line(),
            vec!["x", "options=a"]
        );
    }
}
