use crate::errors::{JobError, Result};
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub type JobId = Uuid;
pub type OutputBlob = bytes::Bytes;
pub type Args = Vec<String>;

const CODE: &str = "{code}";
const OPTIONS: &str = "{options}";
const ARGUMENTS: &str = "{arguments}";

/// One element of a launcher template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LauncherArg {
    Literal(String),
    /// Path of the file holding the job's code.
    Code,
    /// Expands to every option, in order.
    Options,
    /// Expands to every argument, in order.
    Arguments,
}

/// The argv template used to start a language's interpreter.
///
/// The first element must be a literal program name; the placeholders `{code}`, `{options}` and
/// `{arguments}` may appear anywhere after it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Launcher {
    program: String,
    args: Vec<LauncherArg>,
}

impl Launcher {
    pub fn parse<S: AsRef<str>>(template: &[S]) -> Result<Self> {
        let (program, rest) = template.split_first().ok_or(JobError::EmptyLauncher)?;
        let program = program.as_ref();
        if matches!(program, CODE | OPTIONS | ARGUMENTS) {
            return Err(JobError::PlaceholderProgram(program.to_string()));
        }
        let args = rest
            .iter()
            .map(|arg| match arg.as_ref() {
                CODE => LauncherArg::Code,
                OPTIONS => LauncherArg::Options,
                ARGUMENTS => LauncherArg::Arguments,
                literal => LauncherArg::Literal(literal.to_string()),
            })
            .collect();
        Ok(Self {
            program: program.to_string(),
            args,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Expand the template into the arguments passed after the program name.
    pub fn expand(&self, code: &Path, options: &[String], arguments: &[String]) -> Vec<OsString> {
        let mut argv = Vec::with_capacity(self.args.len() + options.len() + arguments.len());
        for arg in &self.args {
            match arg {
                LauncherArg::Literal(literal) => argv.push(literal.into()),
                LauncherArg::Code => argv.push(code.as_os_str().to_owned()),
                LauncherArg::Options => argv.extend(options.iter().map(OsString::from)),
                LauncherArg::Arguments => argv.extend(arguments.iter().map(OsString::from)),
            }
        }
        argv
    }
}

/// A validated job, ready to hand to an [`Executor`](crate::Executor).
#[derive(Clone, Debug)]
pub struct JobSpec {
    pub launcher: Arc<Launcher>,
    pub code: String,
    pub input: OutputBlob,
    pub arguments: Args,
    pub options: Args,
    pub timeout: Duration,
}
