//! Contains the child-process plumbing for the packaging tools.
//!
//! Every external effect of this crate funnels through [`ToolRunner`]; no
//! other module spawns processes. The runner prepends the configured temp
//! directory (`--tmpdir`) to each call, merges caller environment overlays
//! over the process environment and drains both output streams before
//! returning the exit code.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};

/// One external tool call, assembled with chainable setters.
///
/// The trailing argument, when set, always lands last on the command line,
/// after every flag; operations use it for their main operand (a `.deb`
/// path, a package name, a control file).
pub struct Invocation<'a> {
	args: Vec<OsString>,
	last_arg: Option<OsString>,
	env: HashMap<String, String>,
	current_dir: Option<PathBuf>,
	on_line: Option<Box<dyn FnMut(&str) + 'a>>,
}

impl<'a> Invocation<'a> {
	pub fn new() -> Invocation<'a> {
		Invocation {
			args: Vec::new(),
			last_arg: None,
			env: HashMap::new(),
			current_dir: None,
			on_line: None,
		}
	}

	/// Append one argument.
	pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Invocation<'a> {
		self.args.push(arg.as_ref().to_os_string());
		self
	}

	/// Append several arguments.
	pub fn args<I>(mut self, args: I) -> Invocation<'a>
	where
		I: IntoIterator,
		I::Item: AsRef<OsStr>,
	{
		for arg in args {
			self.args.push(arg.as_ref().to_os_string());
		}
		self
	}

	/// Set the argument appended after everything else.
	pub fn last_arg(mut self, arg: impl AsRef<OsStr>) -> Invocation<'a> {
		self.last_arg = Some(arg.as_ref().to_os_string());
		self
	}

	/// Overlay an environment variable; the overlay wins over the
	/// inherited process environment.
	pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Invocation<'a> {
		self.env.insert(key.into(), value.into());
		self
	}

	/// Run the child in `dir` instead of the current working directory.
	///
	/// Source builds use this; the parent process directory is never
	/// changed, so there is nothing to restore afterwards.
	pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Invocation<'a> {
		self.current_dir = Some(dir.into());
		self
	}

	/// Deliver each stdout line to `callback` as it arrives.
	pub fn on_line(mut self, callback: impl FnMut(&str) + 'a) -> Invocation<'a> {
		self.on_line = Some(Box::new(callback));
		self
	}
}

impl Default for Invocation<'_> {
	fn default() -> Self { Invocation::new() }
}

/// Spawns one of the two wrapped binaries and reports its exit code.
#[derive(Clone, Debug)]
pub struct ToolRunner {
	tool: String,
	tmpdir: Option<PathBuf>,
	verbose: bool,
}

impl ToolRunner {
	/// Runner for the packaging tool.
	pub fn packaging(config: &Config) -> ToolRunner {
		ToolRunner {
			tool: config.pkg_tool.clone(),
			tmpdir: Some(config.tool_tmp().to_path_buf()),
			verbose: config.verbose,
		}
	}

	/// Runner for the dependency-graph companion.
	pub fn graphing(config: &Config) -> ToolRunner {
		ToolRunner {
			tool: config.graph_tool.clone(),
			tmpdir: Some(config.tool_tmp().to_path_buf()),
			verbose: config.verbose,
		}
	}

	/// The binary this runner spawns.
	pub fn tool(&self) -> &str { &self.tool }

	/// Spawn the tool and return its exit code.
	///
	/// stdout is streamed line by line to the invocation callback; stderr
	/// is forwarded to the log. The only fatal failure here is being
	/// unable to spawn or read the child; a non-zero exit is a plain
	/// return value, see [`ToolRunner::run_ok`].
	pub fn run(&self, mut invocation: Invocation) -> Result<i32> {
		let mut command = Command::new(&self.tool);
		if let Some(tmpdir) = &self.tmpdir {
			if let Err(err) = std::fs::create_dir_all(tmpdir) {
				debug!(tmpdir = %tmpdir.display(), "unable to create temp dir: {err}");
			}
			command.arg("--tmpdir").arg(tmpdir);
		}
		if self.verbose {
			command.arg("--verbose");
		}
		command.args(&invocation.args);
		if let Some(last) = &invocation.last_arg {
			command.arg(last);
		}
		command.envs(&invocation.env);
		if let Some(dir) = &invocation.current_dir {
			command.current_dir(dir);
		}
		command.stdin(Stdio::null());
		command.stdout(Stdio::piped());
		command.stderr(Stdio::piped());

		debug!(tool = %self.tool, args = ?invocation.args, "spawning");
		let mut child = command.spawn()?;

		let stdout = child.stdout.take();
		let stderr = child.stderr.take();

		// Both pipes drain concurrently; the child must never block on a
		// full pipe while the parent waits on the other one.
		let mut stderr_text = String::new();
		let stdout_read = std::thread::scope(|scope| {
			let stderr_reader = stderr.map(|mut stderr| {
				scope.spawn(move || {
					let mut text = String::new();
					let _ = stderr.read_to_string(&mut text);
					text
				})
			});

			let mut read = Ok(());
			if let Some(stdout) = stdout {
				for line in BufReader::new(stdout).lines() {
					match line {
						Ok(line) => {
							if let Some(on_line) = invocation.on_line.as_mut() {
								on_line(&line);
							}
						},
						Err(err) => {
							read = Err(err);
							break;
						},
					}
				}
			}

			if let Some(reader) = stderr_reader {
				if let Ok(text) = reader.join() {
					stderr_text = text;
				}
			}
			read
		});
		stdout_read?;

		for line in stderr_text.lines() {
			warn!(tool = %self.tool, "{line}");
		}

		let status = child.wait()?;
		Ok(status.code().unwrap_or(-1))
	}

	/// Spawn the tool and fail unless it exits zero.
	pub fn run_ok(&self, invocation: Invocation) -> Result<()> {
		match self.run(invocation)? {
			0 => Ok(()),
			code => Err(Error::ToolFailed {
				tool: self.tool.clone(),
				code,
			}),
		}
	}
}
