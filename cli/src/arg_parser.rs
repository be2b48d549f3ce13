use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Run code on an execution server
#[derive(Debug, Parser)]
#[clap(version)]
pub struct ArgParser {
    /// The WebSocket URL of the server
    #[clap(
        short = 's',
        long = "server",
        env = "ATO_SERVER",
        default_value = "ws://127.0.0.1:8500"
    )]
    pub server: String,
    /// The sub-command to use
    #[clap(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum SubCommand {
    /// run code and stream its output
    Run {
        #[clap(short = 'l', long)]
        /// language identifier, as configured on the server
        language: String,

        #[clap(short = 'i', long, conflicts_with = "input-file")]
        /// text to feed to the program's stdin
        input: Option<String>,

        #[clap(long)]
        /// file whose contents are fed to the program's stdin
        input_file: Option<PathBuf>,

        #[clap(short = 't', long, default_value_t = 60)]
        /// timeout in seconds
        timeout: i64,

        #[clap(short = 'o', long = "option", allow_hyphen_values = true)]
        /// an option for the interpreter, may be repeated
        options: Vec<String>,

        /// the code to run
        code: String,

        #[clap(allow_hyphen_values = true)]
        /// arguments passed to the program
        arguments: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_run() {
        let args = ArgParser::try_parse_from([
            "cli", "--server", "ws://host:1", "run", "-l", "sh", "-o", "-f", "--option", "-e",
            "--timeout", "5", "echo $1", "one", "-two",
        ])
        .unwrap();
        assert_eq!(args.server, "ws://host:1");
        assert_eq!(
            args.sub_command,
            SubCommand::Run {
                language: "sh".into(),
                input: None,
                input_file: None,
                timeout: 5,
                options: vec!["-f".into(), "-e".into()],
                code: "echo $1".into(),
                arguments: vec!["one".into(), "-two".into()],
            }
        );
    }

    #[test]
    fn input_sources_conflict() {
        let parsed = ArgParser::try_parse_from([
            "cli", "run", "-l", "sh", "--input", "x", "--input-file", "f", "cat",
        ]);
        assert!(parsed.is_err());
    }
}
