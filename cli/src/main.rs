mod arg_parser;
mod client_cli;

use arg_parser::{ArgParser, SubCommand};
use client_cli::ClientCli;
use protocol::JobRequest;

use clap::Parser;
use std::error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    let args = ArgParser::parse();
    let mut client = ClientCli::connect(&args.server).await?;

    let code = match args.sub_command {
        SubCommand::Run {
            language,
            input,
            input_file,
            timeout,
            options,
            code,
            arguments,
        } => {
            let input = match (input, input_file) {
                (Some(text), _) => text.into_bytes(),
                (None, Some(path)) => tokio::fs::read(&path).await?,
                (None, None) => vec![],
            };
            let request = JobRequest::new(language, code)
                .input(input)
                .arguments(arguments)
                .options(options)
                .timeout(timeout);
            let report = client.run(&request).await?;
            eprintln!("{}", client_cli::describe(&report));
            client_cli::exit_code(&report)
        }
    };

    client.close().await?;
    std::process::exit(code)
}
